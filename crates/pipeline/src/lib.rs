//! Async boundary of the Aduana reconciliation engine.
//!
//! The synchronous core (`aduana-core`) never suspends; everything that
//! talks to the outside world lives here: the collaborator traits for
//! declared-entry loading, document retrieval, AI extraction, rate
//! snapshots, and report publishing, plus the batch coordinator that drives
//! entries concurrently under an extraction semaphore.

pub mod adapters;
pub mod coordinator;
pub mod extract;

pub use adapters::{
    DeclaredEntrySource, DocumentStore, ExtractError, InvoiceExtractor, RateProvider, ReportSink,
};
pub use coordinator::{BatchCoordinator, DocumentInput};
pub use extract::{RetryPolicy, RetryingExtractor};
