use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::Provider;

/// How the session reaches a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Cleartext for the whole session.
    Plain,
    /// TLS from the first byte (465, 993).
    ImplicitTls,
    /// Cleartext greeting, then STARTTLS before any other command (587, 143).
    ExplicitTls,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::ImplicitTls => "tls",
            Self::ExplicitTls => "starttls",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "none" => Ok(Self::Plain),
            "tls" | "ssl" | "implicit-tls" => Ok(Self::ImplicitTls),
            "starttls" | "explicit-tls" => Ok(Self::ExplicitTls),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// A concrete `(host, port, transport)` tuple to open a protocol session against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointCandidate {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

impl EndpointCandidate {
    pub fn new(host: impl Into<String>, port: u16, transport: Transport) -> Self {
        Self {
            host: host.into(),
            port,
            transport,
        }
    }

    pub(crate) fn dedup_key(&self) -> (String, u16) {
        (self.host.to_ascii_lowercase(), self.port)
    }
}

impl fmt::Display for EndpointCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.transport)
    }
}

/// What the candidates will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Handshake-level existence probing.
    Exchange,
    /// Authenticated message submission.
    Submission,
    /// IMAP mailbox scanning.
    Mailbox,
}

/// Endpoint lists configured for one domain, taking precedence over the built-in table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointPreset {
    #[serde(default)]
    pub exchange: Vec<EndpointCandidate>,
    #[serde(default)]
    pub submission: Vec<EndpointCandidate>,
    #[serde(default)]
    pub mailbox: Vec<EndpointCandidate>,
}

impl EndpointPreset {
    pub fn for_purpose(&self, purpose: Purpose) -> &[EndpointCandidate] {
        match purpose {
            Purpose::Exchange => &self.exchange,
            Purpose::Submission => &self.submission,
            Purpose::Mailbox => &self.mailbox,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exchange.is_empty() && self.submission.is_empty() && self.mailbox.is_empty()
    }
}

/// Ordered candidates plus the provider they were derived for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub provider: Provider,
    pub purpose: Purpose,
    pub candidates: Vec<EndpointCandidate>,
}
