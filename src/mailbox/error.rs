use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS setup failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("TLS handshake with {host} failed: {detail}")]
    TlsHandshake { host: String, detail: String },
    #[error("login refused: {source}")]
    Login {
        #[source]
        source: imap::error::Error,
    },
    #[error("IMAP error: {source}")]
    Imap {
        #[source]
        source: imap::error::Error,
    },
    #[error("malformed message: {source}")]
    Parse {
        #[source]
        source: mailparse::MailParseError,
    },
}

impl MailboxError {
    pub(crate) fn connect(host: &str, source: std::io::Error) -> Self {
        Self::Connect {
            host: host.to_string(),
            source,
        }
    }

    pub(crate) fn imap(source: imap::error::Error) -> Self {
        Self::Imap { source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. } | Self::Tls { .. } | Self::TlsHandshake { .. } => {
                ErrorKind::ConnectionFailed
            }
            Self::Login { .. } => ErrorKind::AuthenticationFailed,
            Self::Imap { source } => match source {
                imap::error::Error::Io(_)
                | imap::error::Error::Tls(_)
                | imap::error::Error::TlsHandshake(_)
                | imap::error::Error::ConnectionLost => {
                    ErrorKind::ConnectionFailed
                }
                _ => ErrorKind::ProtocolError,
            },
            Self::Parse { .. } => ErrorKind::ProtocolError,
        }
    }
}
