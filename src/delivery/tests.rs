use std::collections::HashMap;
use std::sync::Mutex;

use lettre::Message;

use super::transport::Dispatcher;
use super::{DeliveryError, Router, SendAttempt, SmtpCredentials};
use crate::batch::CancelToken;
use crate::config::Config;
use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, EndpointPreset, Provider, Transport};

/// Answers per `host:port`; anything unlisted is refused at connect time.
#[derive(Default)]
struct StubDispatcher {
    outcomes: HashMap<String, (ErrorKind, Option<u16>, &'static str)>,
    accept: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StubDispatcher {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }
}

impl Dispatcher for StubDispatcher {
    fn dispatch(
        &self,
        endpoint: &EndpointCandidate,
        _message: &Message,
        _credentials: Option<&SmtpCredentials>,
    ) -> Result<(), DeliveryError> {
        let key = format!("{}:{}", endpoint.host, endpoint.port);
        self.calls.lock().expect("calls").push(key.clone());
        if self.accept.contains(&key) {
            return Ok(());
        }
        let (kind, code, detail) = self
            .outcomes
            .get(&key)
            .copied()
            .unwrap_or((ErrorKind::ConnectionFailed, None, "connection refused"));
        Err(DeliveryError::dispatch(kind, code, detail))
    }
}

fn attempt(sender: &str) -> SendAttempt {
    SendAttempt {
        sender: sender.to_string(),
        recipient: "bob@example.net".to_string(),
        subject: "Quarterly numbers".to_string(),
        body: "See attached summary.".to_string(),
        provider_hint: None,
        credentials: Some(SmtpCredentials::new(sender, "hunter2")),
    }
}

#[test]
fn only_last_endpoint_succeeds_after_each_prior_tried_once() {
    let config = Config::default();
    let stub = StubDispatcher {
        accept: vec!["smtp.zoho.eu:465".to_string()],
        ..StubDispatcher::default()
    };
    let outcome = Router::new(&config).send_with(&attempt("ann@zoho.com"), &stub);

    assert!(outcome.success);
    assert_eq!(outcome.provider, Provider::Zoho);
    let used = outcome.endpoint_used.expect("endpoint");
    assert_eq!((used.host.as_str(), used.port), ("smtp.zoho.eu", 465));
    let calls = stub.calls();
    assert_eq!(calls.last().map(String::as_str), Some("smtp.zoho.eu:465"));
    let mut unique = calls.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), calls.len(), "an endpoint was tried twice: {calls:?}");
    assert_eq!(calls.len(), 6);
    assert_eq!(outcome.attempts.len(), 6);
    assert!(outcome.attempts[..5].iter().all(|a| !a.succeeded()));
}

#[test]
fn explicit_tls_is_tried_before_implicit_tls() {
    let config = Config::default();
    let stub = StubDispatcher::default();
    let outcome = Router::new(&config).send_with(&attempt("ann@gmail.com"), &stub);

    assert!(!outcome.success);
    assert_eq!(stub.calls(), vec!["smtp.gmail.com:587", "smtp.gmail.com:465"]);
    assert_eq!(outcome.error_kind, Some(ErrorKind::ConnectionFailed));
}

#[test]
fn authentication_failure_wins_and_carries_remediation() {
    let config = Config::default();
    let mut stub = StubDispatcher::default();
    stub.outcomes.insert(
        "smtp.gmail.com:587".into(),
        (
            ErrorKind::AuthenticationFailed,
            Some(535),
            "535 5.7.8 Username and Password not accepted",
        ),
    );
    let outcome = Router::new(&config).send_with(&attempt("ann@gmail.com"), &stub);

    assert!(!outcome.success);
    // the next candidate was still tried
    assert_eq!(stub.calls().len(), 2);
    assert_eq!(outcome.error_kind, Some(ErrorKind::AuthenticationFailed));
    let detail = outcome.error_detail.expect("detail");
    assert!(detail.contains("smtp.gmail.com:587 via starttls"), "{detail}");
    assert!(outcome.remediation.expect("remediation").contains("app password"));
}

#[test]
fn protocol_error_reported_over_connection_failure() {
    let mut config = Config::default();
    config.provider_overrides.insert(
        "corp.example".into(),
        EndpointPreset {
            submission: vec![
                EndpointCandidate::new("relay1.corp.example", 25, Transport::Plain),
                EndpointCandidate::new("relay2.corp.example", 25, Transport::Plain),
            ],
            ..EndpointPreset::default()
        },
    );
    let mut stub = StubDispatcher::default();
    stub.outcomes.insert(
        "relay1.corp.example:25".into(),
        (ErrorKind::ProtocolError, Some(554), "554 5.7.1 relay denied"),
    );
    let outcome = Router::new(&config).send_with(&attempt("ops@corp.example"), &stub);

    assert_eq!(outcome.error_kind, Some(ErrorKind::ProtocolError));
    assert!(outcome.remediation.is_none());
    assert_eq!(stub.calls()[..2], ["relay1.corp.example:25", "relay2.corp.example:25"]);
}

#[test]
fn invalid_recipient_never_dials() {
    let config = Config::default();
    let stub = StubDispatcher::default();
    let mut bad = attempt("ann@gmail.com");
    bad.recipient = "not an address".into();
    let outcome = Router::new(&config).send_with(&bad, &stub);

    assert_eq!(outcome.error_kind, Some(ErrorKind::SyntaxInvalid));
    assert!(stub.calls().is_empty());
}

#[test]
fn cancelled_router_stops_before_dialing() {
    let config = Config::default();
    let stub = StubDispatcher::default();
    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = Router::new(&config)
        .with_cancel(cancel)
        .send_with(&attempt("ann@gmail.com"), &stub);

    assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
    assert!(stub.calls().is_empty());
}

#[test]
fn credentials_debug_hides_password() {
    let creds = SmtpCredentials::new("ann@gmail.com", "hunter2");
    assert!(!format!("{creds:?}").contains("hunter2"));
}
