use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid {role} address '{address}': {source}")]
    InvalidAddress {
        role: &'static str,
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("message could not be built: {source}")]
    Message {
        #[source]
        source: lettre::error::Error,
    },
    #[error("TLS parameters for {host}: {source}")]
    TlsParameters {
        host: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },
    #[error("{detail}")]
    Dispatch {
        kind: ErrorKind,
        code: Option<u16>,
        detail: String,
    },
}

impl DeliveryError {
    pub(crate) fn dispatch(kind: ErrorKind, code: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Dispatch {
            kind,
            code,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress { .. } => ErrorKind::SyntaxInvalid,
            Self::Message { .. } => ErrorKind::ProtocolError,
            Self::TlsParameters { .. } => ErrorKind::ConnectionFailed,
            Self::Dispatch { kind, .. } => *kind,
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Dispatch { code, .. } => *code,
            _ => None,
        }
    }
}
