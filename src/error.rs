use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure classes reported by the outward-facing calls.
///
/// These travel inside result structs; none of them is raised as an `Err` for an
/// expected network condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The address failed syntax checks; nothing else was attempted.
    SyntaxInvalid,
    /// DNS or MX records were absent or the lookup failed.
    ResolutionFailed,
    /// Connect, TLS or I/O failure after all retries.
    ConnectionFailed,
    /// The server refused the supplied credentials.
    AuthenticationFailed,
    /// The server answered without committing (252 and similar).
    AmbiguousProtocolResponse,
    /// The domain accepts any local part.
    CatchAllDetected,
    /// The server rejected the transaction for a non-authentication reason.
    ProtocolError,
    /// Every candidate was exhausted without a verdict.
    NoDetermination,
    /// The caller cancelled the operation.
    Cancelled,
}

impl ErrorKind {
    /// Whether retrying later has a reasonable chance of a different result.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::ConnectionFailed | Self::NoDetermination)
    }

    /// Rank used to pick the failure to report when every endpoint failed:
    /// authentication beats protocol beats connection trouble.
    pub fn severity(self) -> u8 {
        match self {
            Self::AuthenticationFailed => 3,
            Self::ProtocolError => 2,
            Self::ConnectionFailed => 1,
            _ => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxInvalid => "syntax_invalid",
            Self::ResolutionFailed => "resolution_failed",
            Self::ConnectionFailed => "connection_failed",
            Self::AuthenticationFailed => "authentication_failed",
            Self::AmbiguousProtocolResponse => "ambiguous_protocol_response",
            Self::CatchAllDetected => "catch_all_detected",
            Self::ProtocolError => "protocol_error",
            Self::NoDetermination => "no_determination",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
