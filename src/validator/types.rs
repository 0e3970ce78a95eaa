use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    pub original: String,
    pub local: String,
    pub domain: String,
    pub ascii_domain: String,
    pub mode: ValidationMode,
    pub valid: bool,
    pub reasons: Vec<String>,
}

/// A syntactically valid address, split once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub local_part: String,
    /// Lower-cased domain as written by the user.
    pub domain: String,
    /// IDNA (punycode) form of `domain`, used for every DNS and SMTP exchange.
    pub ascii_domain: String,
}

impl Address {
    /// Address in the form used on the wire (`local@ascii-domain`).
    pub fn wire(&self) -> String {
        format!("{}@{}", self.local_part, self.ascii_domain)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("invalid format: {}", reasons.join("; "))]
    InvalidFormat { reasons: Vec<String> },
}

impl EmailError {
    pub(crate) fn invalid(reasons: Vec<String>) -> Self {
        Self::InvalidFormat { reasons }
    }

    pub fn reasons(&self) -> Vec<String> {
        let Self::InvalidFormat { reasons } = self;
        reasons.clone()
    }
}
