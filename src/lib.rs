#![forbid(unsafe_code)]

pub mod app;
pub mod assembler;
pub mod assets;
pub mod authoring;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod model;
pub mod mutator;
pub mod quiz;
pub mod users;

/// Fresh identifier for a catalog node, user or object token.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
