//! # Stores
//!
//! Persistence seams for jobs, batch tasks, the durable retry queue and the
//! credential pool. [`InMemoryStore`] backs tests and database-less deployments;
//! [`PgStore`] is the PostgreSQL implementation.
//!
//! ## Example
//!
//! ```rust
//! use translation_orchestrator::store::{CredentialStore, InMemoryStore};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::with_credentials(["AIzaSy-example-0001"]);
//! let again = store.add_credential("AIzaSy-example-0001").await.unwrap();
//! assert_eq!(again.id, 1);
//! assert_eq!(store.list_credentials().await.unwrap().len(), 1);
//! # });
//! ```

pub mod errors;
pub mod in_memory;
pub mod postgres;
pub mod traits;

pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryStore;
pub use postgres::PgStore;
pub use traits::{CredentialStore, JobStore};
