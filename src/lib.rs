//! Biocaching - client SDK for the Biocaching observation API
//!
//! The SDK signs a user in, keeps their session in durable key-value storage,
//! and turns the server's observation records into a stable canonical model:
//! session restore → API call (via an injected transport) → normalization.
//!
//! ## Modules
//!
//! - **Session**: persisted identity with fail-closed restore and a one-time
//!   language seed
//! - **Normalizer**: pure mapping from raw server records to [`Observation`]s
//! - **Client**: the endpoint surface, generic over [`Transport`] and
//!   [`KeyValueStore`]

pub mod client;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod schema;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;

pub use client::Biocaching;
pub use config::ClientConfig;
pub use error::{ClientError, NormalizationError, SessionError, StorageError, TransportError};
pub use normalizer::ObservationNormalizer;
pub use session::SessionStore;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{ApiRequest, Method, RequestBody, Transport};
pub use types::{AuthState, Observation, Session, UserDirectory, UserId};

#[cfg(feature = "http")]
pub use transport::HttpTransport;

/// SDK version
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
