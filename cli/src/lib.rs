//! devkit CLI library: exposed as a lib so integration and unit tests can
//! exercise modules directly.

pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infra;
pub mod seed;
