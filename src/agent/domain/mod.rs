//! Agent domain: sessions, usage, batch calls and the discovery cache.

mod batch;
mod discovery;
mod error;
mod session;

pub use batch::{BatchCallOutcome, BatchToolCall};
pub(crate) use discovery::DiscoveryCache;
pub use error::{AgentApiError, AgentApiResult};
pub use session::{AgentSession, AgentUsage, SessionId};
