// Core custom-commands module - trigger classification, scope filtering,
// interval scheduling and the command service that ties them together.
// Following the same pattern as the other core modules.

pub mod command_models;
pub mod command_service;
pub mod cooldown;
pub mod interval;
pub mod scope;
pub mod triggers;

pub use command_models::*;
pub use command_service::*;
