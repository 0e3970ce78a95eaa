use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmtpVerifyError {
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no socket address for {host}")]
    NoAddress { host: String },
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("TLS setup failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("STARTTLS required but not advertised by {host}")]
    StartTlsUnavailable { host: String },
    #[error("verification cancelled")]
    Cancelled,
}

impl SmtpVerifyError {
    pub(crate) fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }

    pub(crate) fn connect(host: &str, source: std::io::Error) -> Self {
        Self::Connect {
            host: host.to_string(),
            source,
        }
    }

    /// Transport-level failures that a later attempt on the same endpoint may not hit.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. }
                | Self::NoAddress { .. }
                | Self::Connect { .. }
                | Self::Io { .. }
                | Self::Tls { .. }
        )
    }
}
