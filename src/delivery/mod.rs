//! Delivery Router: submits a composed message through the sender's provider,
//! walking submission endpoints in order until one accepts it.

mod error;
mod transport;
mod types;

pub use error::DeliveryError;
pub use types::{EndpointAttempt, SendAttempt, SendOutcome, SmtpCredentials};

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use tracing::{debug, info, warn};

use crate::batch::CancelToken;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, Provider, Purpose};
use crate::validator::Address;

use transport::{Dispatcher, LettreDispatcher};

/// Sends with default configuration.
pub fn send(attempt: &SendAttempt) -> SendOutcome {
    Router::new(&Config::default()).send(attempt)
}

pub struct Router<'a> {
    config: &'a Config,
    cancel: CancelToken,
}

impl<'a> Router<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn send(&self, attempt: &SendAttempt) -> SendOutcome {
        let dispatcher = LettreDispatcher {
            timeout: self.config.timeout(),
            helo_domain: self.config.helo_domain.clone(),
            accept_invalid_certs: self.config.accept_invalid_certs,
        };
        self.send_with(attempt, &dispatcher)
    }

    pub(crate) fn send_with<D>(&self, attempt: &SendAttempt, dispatcher: &D) -> SendOutcome
    where
        D: Dispatcher + ?Sized,
    {
        let sender = match Address::parse(&attempt.sender) {
            Ok(sender) => sender,
            Err(err) => {
                return SendOutcome::rejected_before_sending(
                    attempt.provider_hint.unwrap_or(Provider::Unknown),
                    ErrorKind::SyntaxInvalid,
                    format!("sender: {err}"),
                );
            }
        };
        let resolution = self.config.endpoint_resolver().resolve(
            &sender.ascii_domain,
            attempt.provider_hint,
            Purpose::Submission,
        );
        let provider = resolution.provider;

        let message = match compose(attempt) {
            Ok(message) => message,
            Err(err) => {
                return SendOutcome::rejected_before_sending(provider, err.kind(), err.to_string());
            }
        };

        let mut attempts: Vec<EndpointAttempt> = Vec::new();
        let mut failures: Vec<(EndpointCandidate, DeliveryError)> = Vec::new();
        for endpoint in resolution.candidates {
            if self.cancel.is_cancelled() {
                let mut outcome = SendOutcome::rejected_before_sending(
                    provider,
                    ErrorKind::Cancelled,
                    "send cancelled".to_string(),
                );
                outcome.attempts = attempts;
                return outcome;
            }

            debug!(target: "mailprobe::delivery", endpoint = %endpoint, "submitting");
            match dispatcher.dispatch(&endpoint, &message, attempt.credentials.as_ref()) {
                Ok(()) => {
                    info!(
                        target: "mailprobe::delivery",
                        endpoint = %endpoint,
                        recipient = %attempt.recipient,
                        "message accepted"
                    );
                    attempts.push(EndpointAttempt {
                        endpoint: endpoint.clone(),
                        error_kind: None,
                        error_detail: None,
                    });
                    return SendOutcome {
                        success: true,
                        provider,
                        endpoint_used: Some(endpoint),
                        error_kind: None,
                        error_detail: None,
                        remediation: None,
                        attempts,
                    };
                }
                Err(err) => {
                    warn!(
                        target: "mailprobe::delivery",
                        endpoint = %endpoint,
                        kind = %err.kind(),
                        error = %err,
                        "submission failed"
                    );
                    attempts.push(EndpointAttempt {
                        endpoint: endpoint.clone(),
                        error_kind: Some(err.kind()),
                        error_detail: Some(err.to_string()),
                    });
                    failures.push((endpoint, err));
                }
            }
        }

        exhausted(provider, attempts, failures)
    }
}

fn compose(attempt: &SendAttempt) -> Result<Message, DeliveryError> {
    let mailbox = |role: &'static str, address: &str| {
        address
            .trim()
            .parse::<Mailbox>()
            .map_err(|source| DeliveryError::InvalidAddress {
                role,
                address: address.to_string(),
                source,
            })
    };
    Message::builder()
        .from(mailbox("sender", &attempt.sender)?)
        .to(mailbox("recipient", &attempt.recipient)?)
        .subject(attempt.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(attempt.body.clone())
        .map_err(|source| DeliveryError::Message { source })
}

fn exhausted(
    provider: Provider,
    attempts: Vec<EndpointAttempt>,
    failures: Vec<(EndpointCandidate, DeliveryError)>,
) -> SendOutcome {
    // max_by_key keeps the last of equal keys: the latest failure of the worst class
    let worst = failures
        .iter()
        .max_by_key(|(_, err)| err.kind().severity());

    let (kind, detail) = match worst {
        Some((endpoint, err)) => (
            err.kind(),
            format!(
                "{err} (endpoint {}:{} via {})",
                endpoint.host, endpoint.port, endpoint.transport
            ),
        ),
        None => (
            ErrorKind::ResolutionFailed,
            "no submission endpoints for sender domain".to_string(),
        ),
    };
    let remediation = if kind == ErrorKind::AuthenticationFailed {
        Some(
            provider
                .auth_remediation()
                .unwrap_or("check the username and password for this account")
                .to_string(),
        )
    } else {
        None
    };

    SendOutcome {
        success: false,
        provider,
        endpoint_used: None,
        error_kind: Some(kind),
        error_detail: Some(detail),
        remediation,
        attempts,
    }
}

#[cfg(test)]
mod tests;
