//! Authentication recovery for outbound requests
//!
//! Sits between application code and a fixed set of named transports. When a
//! transport reports auth-required, the request is suspended instead of
//! failing: it is buffered per transport, a `LoginRequired` event is
//! published, and the caller keeps waiting. Once re-authentication has been
//! decided out of band, the application confirms (every suspended request is
//! replayed, optionally rewritten first) or cancels (every suspended request
//! is rejected, or abandoned when no reason is given).
//!
//! Components, bottom-up:
//! 1. `RequestBuffer` holds one transport's suspended requests for one episode
//! 2. `TransportInterceptor` classifies outcomes and suspends auth failures
//! 3. `AuthCoordinator` owns the registry and drives confirm/cancel
//!
//! Forbidden outcomes are never suspended; they are published and returned.

pub mod buffer;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod interceptor;
mod metrics;
pub mod pending;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use buffer::{Drained, EpisodeId, ReplayHandle, RequestBuffer};
pub use coordinator::{AuthCoordinator, CoordinatorBuilder, DynTransport};
pub use error::{Error, RequestError, Result};
pub use events::{AuthEvent, BroadcastSink, EventSink};
pub use interceptor::{SettlementFor, TransportInterceptor};
pub use pending::{PendingResult, Settlement, Settler};
pub use registry::TransportName;
