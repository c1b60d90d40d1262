// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

pub mod events;

// Re-export command types for convenience
pub use commands::custom_commands::{Context, Data, Error};
