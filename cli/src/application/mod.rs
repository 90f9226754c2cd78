//! Application services: multi-step orchestration over the infra layer.

pub mod layout_engine;
pub mod seeding;
