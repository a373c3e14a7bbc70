//! Client ports.

mod recoverer;
mod transport;

#[cfg(test)]
pub use recoverer::MockRecoverer;
pub use recoverer::{NoopRecoverer, Recoverer};
pub use transport::{McpTransport, TransportFactory};
