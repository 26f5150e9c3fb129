//! Remote account credentials
//!
//! The secret half is wrapped in [`Secret`], which never prints its value, so
//! credentials can be passed to `debug!` and error messages without leaking.

use crate::{AuditError, Result};
use std::fmt;

/// Password or token that is redacted in every formatted representation
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, only for handing to the transport
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Account used to open remote sessions. Shared read-only by all workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::new(secret),
        }
    }

    /// Load credentials from the process environment.
    ///
    /// A `.env` file in the working directory is read first if it exists.
    /// `NETAUDIT_USERNAME`/`NETAUDIT_PASSWORD` take precedence over the
    /// plain `USERNAME`/`PASSWORD` pair.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                log::warn!("Failed to load .env file: {}", e);
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |primary: &str, fallback: &str| {
            lookup(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(fallback).filter(|v| !v.is_empty()))
        };

        let username = pick("NETAUDIT_USERNAME", "USERNAME").ok_or_else(|| {
            AuditError::ConfigError("NETAUDIT_USERNAME (or USERNAME) is not set".to_string())
        })?;
        let secret = pick("NETAUDIT_PASSWORD", "PASSWORD").ok_or_else(|| {
            AuditError::ConfigError("NETAUDIT_PASSWORD (or PASSWORD) is not set".to_string())
        })?;

        Ok(Self::new(username, secret))
    }
}
