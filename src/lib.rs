//! `oztf-network` is the resilient request layer of the OZTF staff/project
//! client.
//!
//! [`RequestCoordinator`] sends requests to logical endpoints and adds:
//! - per-endpoint exponential backoff for transient failures
//! - batch sessions with settled, never-failing aggregate results
//! - a single aggregated retry prompt when requests exhaust their retries
//!
//! Endpoint lookup, HTTP exchange, timers and the prompt are collaborators
//! behind the [`EndpointRegistry`], [`Transport`], [`Scheduler`] and
//! [`Dialog`] traits.

mod classify;
pub mod codes;
mod coordinator;
mod dialog;
mod endpoint;
mod error;
mod options;
mod retry;
mod scheduler;
mod transport;
mod types;
mod wire;

pub use coordinator::{CoordinatorBuilder, RequestCoordinator};
pub use dialog::{Dialog, DialogButton, DialogReply, DismissDialog, RetryPrompt};
pub use endpoint::{EndpointConfig, EndpointRegistry, EndpointTable, HttpMethod};
pub use error::{RequestError, SchedulerError, TransportError};
pub use options::{CoordinatorOptions, DEFAULT_BASE_URL};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use scheduler::{Scheduler, TimerCallback, TimerHandle, TokioScheduler};
pub use transport::{HttpTransport, Transport};
pub use types::{BatchRequest, Completion, RequestResult, Settled};
pub use wire::{Envelope, Meta};
