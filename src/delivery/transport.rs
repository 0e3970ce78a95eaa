use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{Message, SmtpTransport, Transport as _};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::delivery::error::DeliveryError;
use crate::delivery::types::SmtpCredentials;
use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, Transport};

/// Hands one message to one endpoint.
pub(crate) trait Dispatcher {
    fn dispatch(
        &self,
        endpoint: &EndpointCandidate,
        message: &Message,
        credentials: Option<&SmtpCredentials>,
    ) -> Result<(), DeliveryError>;
}

/// Submission over lettre's blocking SMTP transport.
pub(crate) struct LettreDispatcher {
    pub timeout: Duration,
    pub helo_domain: Option<String>,
    pub accept_invalid_certs: bool,
}

impl LettreDispatcher {
    fn tls(&self, endpoint: &EndpointCandidate) -> Result<Tls, DeliveryError> {
        let parameters = || {
            TlsParameters::builder(endpoint.host.clone())
                .dangerous_accept_invalid_certs(self.accept_invalid_certs)
                .build()
                .map_err(|source| DeliveryError::TlsParameters {
                    host: endpoint.host.clone(),
                    source,
                })
        };
        Ok(match endpoint.transport {
            Transport::Plain => Tls::None,
            Transport::ImplicitTls => Tls::Wrapper(parameters()?),
            Transport::ExplicitTls => Tls::Required(parameters()?),
        })
    }
}

impl Dispatcher for LettreDispatcher {
    fn dispatch(
        &self,
        endpoint: &EndpointCandidate,
        message: &Message,
        credentials: Option<&SmtpCredentials>,
    ) -> Result<(), DeliveryError> {
        let mut builder = SmtpTransport::builder_dangerous(endpoint.host.as_str())
            .port(endpoint.port)
            .tls(self.tls(endpoint)?)
            .timeout(Some(self.timeout));
        if let Some(helo) = &self.helo_domain {
            builder = builder.hello_name(ClientId::Domain(helo.clone()));
        }
        if let Some(credentials) = credentials {
            builder = builder.credentials(Credentials::new(
                credentials.username.clone(),
                credentials.password.clone(),
            ));
        }
        let mailer = builder.build();
        mailer.send(message).map(|_| ()).map_err(|err| {
            let code = err
                .status()
                .and_then(|code| code.to_string().parse::<u16>().ok());
            let kind = classify_failure(code, &err.to_string());
            DeliveryError::dispatch(kind, code, err.to_string())
        })
    }
}

static AUTH_WORDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(authentication|auth(entication)? (failed|required)|credentials|username and password|invalid login|application-specific password|app password)")
        .expect("static regex")
});

/// Sorts a failed submission into authentication, connection or protocol trouble.
///
/// `code` is the SMTP reply code if the server answered at all.
pub(crate) fn classify_failure(code: Option<u16>, message: &str) -> ErrorKind {
    match code {
        Some(530 | 534 | 535 | 538) => ErrorKind::AuthenticationFailed,
        Some(454) if AUTH_WORDING.is_match(message) => ErrorKind::AuthenticationFailed,
        Some(code) if (400..500).contains(&code) => ErrorKind::ConnectionFailed,
        Some(_) if AUTH_WORDING.is_match(message) => ErrorKind::AuthenticationFailed,
        Some(_) => ErrorKind::ProtocolError,
        None if AUTH_WORDING.is_match(message) => ErrorKind::AuthenticationFailed,
        // no reply at all: socket, TLS or timeout trouble
        None => ErrorKind::ConnectionFailed,
    }
}
