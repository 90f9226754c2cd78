//! Infrastructure: process execution, docker/compose/tmux/git invocation,
//! filesystem access. Everything here goes through the [`runner::Runner`]
//! so dry-run and command echo behave uniformly.

pub mod command_runner;
pub mod compose;
pub mod containers;
pub mod fsutil;
pub mod hosts;
pub mod ingress;
pub mod network;
pub mod overlay_store;
pub mod runner;
pub mod tmux;
pub mod worktrees;
