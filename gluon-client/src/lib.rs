//! Gluon Journal Client
//!
//! Data-access layer for the journal program: reads go through a
//! session-scoped [`QueryCache`](gluon_cache::QueryCache), writes go through a
//! [`MutationOrchestrator`] that invalidates the affected reads once the
//! ledger confirms them.
//!
//! # Example
//!
//! ```ignore
//! let ledger = Arc::new(LocalLedger::default());
//! let client = JournalClient::builder(Cluster::localnet(), ledger)
//!     .signer(Arc::new(KeypairSigner::from_seed(seed)))
//!     .build();
//!
//! client.create_entry("Day1", "hello").await?;
//! let entries = client.accounts().await;
//! ```

pub mod config;
pub mod ledger;
pub mod mutation;
pub mod notifications;
pub mod program;
pub mod queries;
pub mod session;
pub mod signer;
pub mod telemetry;
pub mod transport;

pub use config::{CacheSettings, ClientConfig, ConfigError, LogFormat, LoggingConfig};
pub use ledger::{rent_exempt_minimum, LocalLedger, TransactionRecord};
pub use mutation::{
    MutationOrchestrator, MutationOutcome, MutationRequest, MutationState, MutationStatus,
    OutcomeChannel,
};
pub use notifications::{
    Notification, NotificationCenter, NotificationLevel, NotificationRelay, NotificationSink,
    TracingSink,
};
pub use program::{DeleteTarget, ProgramClient, ProgramInfo};
pub use queries::SessionCaches;
pub use session::{JournalClient, JournalClientBuilder};
pub use signer::{KeypairSigner, Signer};
pub use telemetry::{init_tracing, DEFAULT_FILTER};
pub use transport::{
    AccountInfo, KeyedAccount, RemoteTransport, Submission, UnsignedSubmission,
    UPGRADEABLE_LOADER_ID,
};
