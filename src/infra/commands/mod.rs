// Store implementations for the custom-commands core.

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::{InMemoryCommandStore, InMemoryScheduledEvents};
pub use sqlite_store::{SqliteCommandStore, SqliteScheduledEventStore};
