use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, Provider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Reply,
    AutoReply,
    Bounce,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::AutoReply => "auto_reply",
            Self::Bounce => "bounce",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permanent, temporary, or a bounce that named neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    Hard,
    Soft,
    Unknown,
}

impl BounceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BounceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of one fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxEvent {
    pub kind: EventKind,
    /// Only set for bounces.
    pub bounce_type: Option<BounceType>,
    pub sender: String,
    pub subject: String,
    /// Original recipient pulled out of a bounce body.
    pub recipient_extracted: Option<String>,
    pub body_excerpt: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
}

/// IMAP login. The password never appears in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxCredentials {
    pub address: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub provider_hint: Option<Provider>,
}

impl MailboxCredentials {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            provider_hint: None,
        }
    }
}

impl fmt::Debug for MailboxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxCredentials")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .field("provider_hint", &self.provider_hint)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub events: Vec<MailboxEvent>,
    pub endpoint_used: Option<EndpointCandidate>,
    /// Messages fetched, classified or not.
    pub scanned: usize,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl ScanOutcome {
    pub(crate) fn failed(kind: ErrorKind, detail: String) -> Self {
        Self {
            events: Vec::new(),
            endpoint_used: None,
            scanned: 0,
            error_kind: Some(kind),
            error_detail: Some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}
