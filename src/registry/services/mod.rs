//! Registry services.

mod registry;

pub use registry::{
    RegistryError, RegistryResult, RegistrySettings, ServerRegistry, ServerResource, ServerTool,
};
