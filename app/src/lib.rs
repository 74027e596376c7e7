//! Invoice issuance service and its command-line handlers.

pub mod commands;
pub mod error;
pub mod identity;
pub mod service;
pub mod setup;

pub use error::ServiceError;
pub use service::{InvoiceService, IssueOutcome};
