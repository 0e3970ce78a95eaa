use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, Provider};

/// Login for the submission server. The password never appears in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpCredentials {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl SmtpCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One composed message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAttempt {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Overrides provider recognition from the sender domain.
    pub provider_hint: Option<Provider>,
    pub credentials: Option<SmtpCredentials>,
}

/// Result of trying one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAttempt {
    pub endpoint: EndpointCandidate,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
}

impl EndpointAttempt {
    pub fn succeeded(&self) -> bool {
        self.error_kind.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub provider: Provider,
    pub endpoint_used: Option<EndpointCandidate>,
    pub error_kind: Option<ErrorKind>,
    pub error_detail: Option<String>,
    /// Provider-specific hint for authentication failures.
    pub remediation: Option<String>,
    /// Every endpoint tried, in order.
    pub attempts: Vec<EndpointAttempt>,
}

impl SendOutcome {
    pub(crate) fn rejected_before_sending(provider: Provider, kind: ErrorKind, detail: String) -> Self {
        Self {
            success: false,
            provider,
            endpoint_used: None,
            error_kind: Some(kind),
            error_detail: Some(detail),
            remediation: None,
            attempts: Vec::new(),
        }
    }
}
