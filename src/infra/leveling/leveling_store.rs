// Implementations for the leveling store.

pub mod in_memory;
pub mod json_store;
pub mod saver;

// Re-export for convenience
pub use in_memory::InMemoryGuildStore;
pub use json_store::JsonGuildStore;
