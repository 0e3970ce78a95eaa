//! Mailbox Classifier: scans a mailbox over IMAP and sorts each message into
//! reply, auto-reply or bounce.

mod classify;
mod error;
mod rules;
mod source;
mod types;

pub use classify::{InboundMessage, classify_message, extract_recipient};
pub use error::MailboxError;
pub use types::{BounceType, EventKind, MailboxCredentials, MailboxEvent, ScanOutcome};

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::batch::CancelToken;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, Purpose};
use crate::validator::Address;

use source::{ImapConnector, MailboxConnector};

/// Scans with default configuration.
pub fn scan_mailbox(credentials: &MailboxCredentials, sent_to: &HashSet<String>) -> ScanOutcome {
    Scanner::new(&Config::default()).scan(credentials, sent_to)
}

pub struct Scanner<'a> {
    config: &'a Config,
    cancel: CancelToken,
}

impl<'a> Scanner<'a> {
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

    pub fn scan(&self, credentials: &MailboxCredentials, sent_to: &HashSet<String>) -> ScanOutcome {
        match ImapConnector::new(self.config.timeout(), self.config.accept_invalid_certs) {
            Ok(connector) => self.scan_with(credentials, sent_to, &connector),
            Err(err) => ScanOutcome::failed(err.kind(), err.to_string()),
        }
    }

    pub(crate) fn scan_with<C>(
        &self,
        credentials: &MailboxCredentials,
        sent_to: &HashSet<String>,
        connector: &C,
    ) -> ScanOutcome
    where
        C: MailboxConnector + ?Sized,
    {
        let account = match Address::parse(&credentials.address) {
            Ok(account) => account,
            Err(err) => {
                return ScanOutcome::failed(ErrorKind::SyntaxInvalid, format!("account: {err}"));
            }
        };
        let resolution = self.config.endpoint_resolver().resolve(
            &account.ascii_domain,
            credentials.provider_hint,
            Purpose::Mailbox,
        );

        let mut failures: Vec<(EndpointCandidate, MailboxError)> = Vec::new();
        for endpoint in resolution.candidates {
            if self.cancel.is_cancelled() {
                return ScanOutcome::failed(ErrorKind::Cancelled, "scan cancelled".to_string());
            }
            debug!(target: "mailprobe::mailbox", endpoint = %endpoint, "opening mailbox");
            match connector.fetch_messages(&endpoint, credentials, self.config.scan_limit) {
                Ok(raw) => {
                    let outcome = self.classify_all(&raw, sent_to, &account.wire(), endpoint);
                    info!(
                        target: "mailprobe::mailbox",
                        scanned = outcome.scanned,
                        events = outcome.events.len(),
                        "mailbox scanned"
                    );
                    return outcome;
                }
                Err(err) => {
                    warn!(
                        target: "mailprobe::mailbox",
                        endpoint = %endpoint,
                        kind = %err.kind(),
                        error = %err,
                        "mailbox session failed"
                    );
                    failures.push((endpoint, err));
                }
            }
        }

        exhausted(resolution.provider.auth_remediation(), failures)
    }

    fn classify_all(
        &self,
        raw: &[Vec<u8>],
        sent_to: &HashSet<String>,
        own_address: &str,
        endpoint: EndpointCandidate,
    ) -> ScanOutcome {
        let mut events = Vec::new();
        for message in raw {
            let parsed = match InboundMessage::parse(message) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(target: "mailprobe::mailbox", error = %err, "skipping unparsable message");
                    continue;
                }
            };
            if parsed.sender.eq_ignore_ascii_case(own_address) {
                continue;
            }
            if let Some(event) = classify_message(&parsed, sent_to) {
                debug!(
                    target: "mailprobe::mailbox",
                    kind = %event.kind,
                    sender = %event.sender,
                    "classified"
                );
                events.push(event);
            }
        }
        let mut outcome = ScanOutcome {
            events,
            endpoint_used: Some(endpoint),
            scanned: raw.len(),
            error_kind: None,
            error_detail: None,
        };
        // The fetch has already flagged these messages \Seen, so they are
        // classified in full even when the scan was cancelled meanwhile.
        if self.cancel.is_cancelled() {
            outcome.error_kind = Some(ErrorKind::Cancelled);
            outcome.error_detail = Some("scan cancelled after fetch".to_string());
        }
        outcome
    }
}

fn exhausted(
    remediation: Option<&str>,
    failures: Vec<(EndpointCandidate, MailboxError)>,
) -> ScanOutcome {
    let worst = failures.iter().max_by_key(|(_, err)| err.kind().severity());
    match worst {
        Some((endpoint, err)) => {
            let kind = err.kind();
            let mut detail = format!("{err} (endpoint {endpoint})");
            if kind == ErrorKind::AuthenticationFailed {
                if let Some(hint) = remediation {
                    detail.push_str(": ");
                    detail.push_str(hint);
                }
            }
            ScanOutcome::failed(kind, detail)
        }
        None => ScanOutcome::failed(
            ErrorKind::ResolutionFailed,
            "no mailbox endpoints for account domain".to_string(),
        ),
    }
}
