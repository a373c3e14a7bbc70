//! Configuration store adapters.

mod json_file;
mod memory;

pub use json_file::JsonFileConfigStore;
pub use memory::InMemoryConfigStore;
