//! Application-wide error types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::guards::GuardError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    Validation(FieldErrors),

    #[error("Action not permitted: {0}")]
    Guard(#[from] GuardError),

    #[error("A transaction for this operation is still in progress")]
    TxBusy,

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Wallet unavailable: no wallet endpoint or account connected")]
    WalletUnavailable,

    #[error("Transaction {0} reverted")]
    Reverted(String),

    #[error("Transaction {0} timed out waiting for confirmation")]
    Timeout(String),

    #[error("Flow cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Inline validation messages keyed by form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_per_field_wins() {
        let mut errors = FieldErrors::new();
        errors.add("amount", "required");
        errors.add("amount", "must be positive");
        assert_eq!(errors.get("amount"), Some("required"));
    }

    #[test]
    fn empty_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());

        let mut errors = FieldErrors::new();
        errors.add("beneficiary", "invalid address");
        match errors.into_result() {
            Err(ClientError::Validation(e)) => {
                assert_eq!(e.to_string(), "beneficiary: invalid address")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
