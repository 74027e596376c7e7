use serde::Serialize;
use std::fmt;

/// A structural problem with an invoice request, pointing at the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{path}: {message}")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self::new(path, "is required")
    }
}

/// Field path helper so nested rules can report `items[2].ncm` style locations.
#[derive(Debug, Clone, Copy)]
pub struct FieldPath<'a> {
    parent: &'a str,
}

impl<'a> FieldPath<'a> {
    pub fn new(parent: &'a str) -> Self {
        Self { parent }
    }

    pub fn join(&self, field: &str) -> String {
        if self.parent.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", self.parent, field)
        }
    }
}

impl fmt::Display for FieldPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.parent)
    }
}
