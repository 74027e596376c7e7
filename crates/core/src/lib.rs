//! NF-e / NFC-e payload construction.
//!
//! Turns a loosely filled [`models::InvoiceRequest`] into the schema-shaped
//! [`document::BuiltDocument`] the fiscal document API accepts. Nothing in
//! this crate performs I/O.

pub mod builder;
pub mod document;
pub mod error;
pub mod models;
pub mod normalize;
pub mod parsing;
pub mod states;
pub mod validation;

pub use builder::{build, Built, Diagnostic, DiagnosticKind};
pub use document::BuiltDocument;
pub use error::ValidationError;
pub use models::InvoiceRequest;
