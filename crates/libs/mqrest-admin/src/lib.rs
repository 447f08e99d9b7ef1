#![allow(clippy::result_large_err)]
#![recursion_limit = "256"]

//! Administrative client for queue managers exposing the `runCommandJSON`
//! mqsc endpoint.
//!
//! A [`CommandSession`] sends one command per call through a [`Transport`],
//! translating attribute names and values between snake_case and the
//! terse wire vocabulary via a shared [`MappingStore`]. Higher-level helpers
//! reconcile objects to a desired state ([`ensure`]) and wait for
//! start/stop transitions to settle ([`sync`]).

pub mod auth;
pub mod config;
pub mod ensure;
pub mod error;
pub mod mapping;
pub mod session;
pub mod sync;
pub mod transport;

pub use auth::Credentials;
pub use config::SessionConfig;
pub use ensure::{values_match, EnsureAction, EnsureResult, EnsureTarget};
pub use error::{CommandError, MqRestError};
pub use mapping::{
    AttributeMapper, Attributes, MappingDirection, MappingDocument, MappingError, MappingIssue,
    MappingOverrideMode, MappingReason, MappingStore,
};
pub use session::{CommandRequest, CommandSession, DisplayFilter};
pub use sync::{
    CancellationFlag, Clock, Interrupted, LifecycleObject, SyncConfig, SyncOperation, SyncResult,
    SystemClock, Transition,
};
#[cfg(feature = "http-transport")]
pub use transport::http::{HttpTransport, TlsSettings};
pub use transport::{Transport, TransportResponse};
