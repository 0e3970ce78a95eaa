use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::resolver::Provider;

/// Classification of the observed SMTP behaviour for a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Existence {
    /// The target was accepted while random aliases were rejected (or not probed).
    Exists,
    /// The target was rejected with an explicit unknown-user response.
    DoesNotExist,
    /// The server also accepted a random alias.
    CatchAll,
    /// Only non-committal answers (252) were observed.
    Ambiguous,
    /// No candidate produced a verdict. Holds the last reason seen.
    Indeterminate(String),
    Cancelled,
}

impl Existence {
    /// A verdict that ends the walk over candidates.
    pub fn is_determined(&self) -> bool {
        matches!(self, Self::Exists | Self::DoesNotExist | Self::CatchAll)
    }
}

impl fmt::Display for Existence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("exists"),
            Self::DoesNotExist => f.write_str("does-not-exist"),
            Self::CatchAll => f.write_str("catch-all"),
            Self::Ambiguous => f.write_str("ambiguous"),
            Self::Indeterminate(reason) => write!(f, "indeterminate ({reason})"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// The command whose reply produced the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationMethod {
    Vrfy,
    Rcpt,
    Expn,
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vrfy => "VRFY",
            Self::Rcpt => "RCPT",
            Self::Expn => "EXPN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub address: String,
    /// Existence determined and `confidence` at or above the threshold.
    pub verified: bool,
    /// The server accepted the recipient (catch-all included).
    pub deliverable: bool,
    /// Certainty of the reported verdict, within `[0, 1]`.
    pub confidence: f32,
    pub existence: Existence,
    pub smtp_code: Option<u16>,
    pub method: Option<VerificationMethod>,
    pub server_used: Option<String>,
    pub port_used: Option<u16>,
    pub catch_all_detected: bool,
    /// VRFY, EXPN and RCPT commands issued across all sessions.
    pub checks_performed: u32,
    pub provider: Provider,
    pub servers_tried: Vec<String>,
    pub duration: Duration,
    pub error: Option<ErrorKind>,
    pub error_detail: Option<String>,
    pub transcript: Vec<String>,
}

impl VerificationResult {
    pub(crate) fn failed(
        address: &str,
        provider: Provider,
        error: ErrorKind,
        detail: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let detail = detail.into();
        let existence = if error == ErrorKind::Cancelled {
            Existence::Cancelled
        } else {
            Existence::Indeterminate(detail.clone())
        };
        Self {
            address: address.to_string(),
            verified: false,
            deliverable: false,
            confidence: 0.0,
            existence,
            smtp_code: None,
            method: None,
            server_used: None,
            port_used: None,
            catch_all_detected: false,
            checks_performed: 0,
            provider,
            servers_tried: Vec::new(),
            duration,
            error: Some(error),
            error_detail: Some(detail),
            transcript: Vec::new(),
        }
    }

    /// True when the mailbox is known not to exist.
    pub fn is_rejected(&self) -> bool {
        self.existence == Existence::DoesNotExist
    }
}
