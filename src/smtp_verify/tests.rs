use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use proptest::prelude::*;

use super::session::{Connector, SmtpChannel, SmtpReply};
use super::util::confidence;
use super::{
    Existence, SmtpVerifyError, VerificationMethod, VerificationResult, Verifier, within_budget,
};
use crate::batch::CancelToken;
use crate::config::{ConfidenceWeights, Config};
use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, EndpointPreset, Transport};
use crate::validator::Address;

/// Rule-driven SMTP peer: each command gets the reply configured for it.
#[derive(Clone)]
struct FakeServer {
    banner: (u16, &'static str),
    ehlo: (u16, &'static str),
    capabilities: Vec<&'static str>,
    vrfy: (u16, &'static str),
    senders: HashMap<&'static str, (u16, &'static str)>,
    rcpt: HashMap<String, (u16, &'static str)>,
    rcpt_default: (u16, &'static str),
}

impl Default for FakeServer {
    fn default() -> Self {
        Self {
            banner: (220, "mx.test ESMTP"),
            ehlo: (250, "mx.test"),
            capabilities: vec!["PIPELINING", "8BITMIME"],
            vrfy: (502, "5.5.1 VRFY command is disabled"),
            senders: HashMap::new(),
            rcpt: HashMap::new(),
            rcpt_default: (550, "5.1.1 <unknown>: Recipient address rejected: User unknown"),
        }
    }
}

impl FakeServer {
    fn accepting(address: &str) -> Self {
        let mut server = Self::default();
        server.rcpt.insert(address.to_string(), (250, "2.1.5 Ok"));
        server
    }
}

struct FakeChannel {
    server: FakeServer,
    log: Arc<Mutex<Vec<String>>>,
    transcript: Vec<String>,
}

impl FakeChannel {
    fn reply(&mut self, (code, text): (u16, &str)) -> SmtpReply {
        self.transcript.push(format!("S: {code} {text}"));
        SmtpReply::new(code, text)
    }
}

impl SmtpChannel for FakeChannel {
    fn read_banner(&mut self) -> Result<SmtpReply, SmtpVerifyError> {
        let banner = self.server.banner;
        Ok(self.reply(banner))
    }

    fn send_command(&mut self, command: &str) -> Result<SmtpReply, SmtpVerifyError> {
        self.log.lock().expect("log").push(command.to_string());
        self.transcript.push(format!("C: {command}"));
        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let argument = command
            .split_once('<')
            .and_then(|(_, rest)| rest.split_once('>'))
            .map(|(inner, _)| inner.to_string())
            .unwrap_or_default();
        let server = self.server.clone();
        let reply = match verb.as_str() {
            "EHLO" if server.ehlo.0 == 250 => {
                let mut lines = vec![server.ehlo.1.to_string()];
                lines.extend(server.capabilities.iter().map(|c| c.to_string()));
                self.transcript.push("S: 250 (capabilities)".to_string());
                return Ok(SmtpReply {
                    code: 250,
                    lines,
                });
            }
            "EHLO" => server.ehlo,
            "HELO" => (250, "mx.test"),
            "VRFY" | "EXPN" => server.vrfy,
            "MAIL" => server
                .senders
                .get(argument.as_str())
                .copied()
                .unwrap_or((250, "2.1.0 Ok")),
            "RCPT" => server
                .rcpt
                .get(&argument)
                .copied()
                .unwrap_or(server.rcpt_default),
            "RSET" => (250, "2.0.0 Ok"),
            _ => (500, "5.5.2 unrecognized command"),
        };
        Ok(self.reply(reply))
    }

    fn starttls(&mut self) -> Result<SmtpReply, SmtpVerifyError> {
        self.send_command("STARTTLS")?;
        Ok(SmtpReply::new(220, "2.0.0 Ready to start TLS"))
    }

    fn quit(&mut self) {
        self.log.lock().expect("log").push("QUIT".to_string());
    }

    fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }
}

#[derive(Default)]
struct FakeConnector {
    servers: HashMap<String, FakeServer>,
    /// Connection failures still to simulate, per host.
    failures: Mutex<HashMap<String, usize>>,
    opened: Mutex<Vec<String>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeConnector {
    fn with(host: &str, server: FakeServer) -> Self {
        let mut connector = Self::default();
        connector.servers.insert(host.to_string(), server);
        connector
    }

    fn fail_first(self, host: &str, times: usize) -> Self {
        self.failures
            .lock()
            .expect("failures")
            .insert(host.to_string(), times);
        self
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().expect("opened").clone()
    }

    fn commands(&self) -> Vec<String> {
        self.log.lock().expect("log").clone()
    }
}

impl Connector for FakeConnector {
    fn open(&self, endpoint: &EndpointCandidate) -> Result<Box<dyn SmtpChannel>, SmtpVerifyError> {
        self.opened
            .lock()
            .expect("opened")
            .push(format!("{}:{}", endpoint.host, endpoint.port));
        let refused = || {
            SmtpVerifyError::connect(
                &endpoint.host,
                io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            )
        };
        if let Some(remaining) = self.failures.lock().expect("failures").get_mut(&endpoint.host) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(refused());
            }
        }
        let server = self.servers.get(&endpoint.host).cloned().ok_or_else(refused)?;
        Ok(Box::new(FakeChannel {
            server,
            log: Arc::clone(&self.log),
            transcript: Vec::new(),
        }))
    }
}

fn test_config() -> Config {
    Config {
        retry_delay_seconds: 0,
        max_servers: 3,
        ..Config::default()
    }
}

fn mx(hosts: &[&str]) -> Vec<String> {
    hosts.iter().map(|h| h.to_string()).collect()
}

fn run(config: &Config, address: &str, mx_hosts: &[String], connector: &FakeConnector) -> VerificationResult {
    let target = Address::parse(address).expect("valid address");
    Verifier::new(config).verify_with(&target, mx_hosts, connector, Instant::now())
}

#[test]
fn accepted_target_with_rejected_probe_exists() {
    let config = test_config();
    let connector = FakeConnector::with("mx1.acme.org", FakeServer::accepting("alice@acme.org"));
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::Exists);
    assert!(result.verified);
    assert!(result.deliverable);
    assert!(!result.catch_all_detected);
    assert_eq!(result.method, Some(VerificationMethod::Rcpt));
    assert_eq!(result.smtp_code, Some(250));
    assert_eq!(result.server_used.as_deref(), Some("mx1.acme.org"));
    assert_eq!(result.port_used, Some(25));
    assert_eq!(result.checks_performed, 3);
    assert!((result.confidence - 0.9).abs() < 1e-5);
    assert!(result.error.is_none());
    assert!(connector.commands().contains(&"QUIT".to_string()));
}

#[test]
fn accepting_every_alias_is_catch_all() {
    let config = test_config();
    let server = FakeServer {
        rcpt_default: (250, "2.1.5 Ok"),
        ..FakeServer::default()
    };
    let connector = FakeConnector::with("mx1.acme.org", server);
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::CatchAll);
    assert!(result.catch_all_detected);
    assert!(result.deliverable);
    assert!(!result.verified);
    assert!(result.confidence <= config.thresholds.catch_all_confidence_cap);
    assert_eq!(result.error, Some(ErrorKind::CatchAllDetected));
}

#[test]
fn unknown_user_is_a_confident_rejection() {
    let config = test_config();
    let connector = FakeConnector::with("mx1.acme.org", FakeServer::default());
    let result = run(&config, "ghost@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::DoesNotExist);
    assert!(result.verified);
    assert!(!result.deliverable);
    assert_eq!(result.smtp_code, Some(550));
    assert!(result.is_rejected());
    assert_eq!(connector.opened(), vec!["mx1.acme.org:25"]);
}

#[test]
fn policy_rejection_moves_to_next_mx() {
    let config = test_config();
    let blocked = FakeServer {
        rcpt_default: (550, "5.7.1 Client host rejected: access denied"),
        ..FakeServer::default()
    };
    let mut connector = FakeConnector::with("mx1.acme.org", blocked);
    connector
        .servers
        .insert("mx2.acme.org".into(), FakeServer::accepting("alice@acme.org"));
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org", "mx2.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::Exists);
    assert_eq!(result.server_used.as_deref(), Some("mx2.acme.org"));
    assert_eq!(result.servers_tried.len(), 2);
    // mx1 answered, so it was not retried
    assert_eq!(connector.opened(), vec!["mx1.acme.org:25", "mx2.acme.org:25"]);
}

#[test]
fn non_committal_252_is_never_verified() {
    let config = Config {
        max_servers: 1,
        ..test_config()
    };
    let server = FakeServer {
        vrfy: (252, "2.1.5 Cannot VRFY user"),
        rcpt_default: (252, "2.1.5 Will attempt delivery"),
        ..FakeServer::default()
    };
    let connector = FakeConnector::with("mx1.acme.org", server);
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::Ambiguous);
    assert!(!result.verified);
    assert!(!result.deliverable);
    assert_eq!(result.smtp_code, Some(252));
    assert_eq!(result.error, Some(ErrorKind::AmbiguousProtocolResponse));
    assert!(result.confidence < config.thresholds.confidence_threshold);
}

#[test]
fn connection_failure_is_retried_on_the_same_endpoint() {
    let config = test_config();
    let connector = FakeConnector::with("mx1.acme.org", FakeServer::accepting("alice@acme.org"))
        .fail_first("mx1.acme.org", 1);
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::Exists);
    assert_eq!(connector.opened(), vec!["mx1.acme.org:25", "mx1.acme.org:25"]);
    assert_eq!(result.servers_tried, vec!["mx1.acme.org:25/plain"]);
}

#[test]
fn unreachable_endpoints_report_connection_failure() {
    let config = test_config();
    let connector = FakeConnector::default();
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.error, Some(ErrorKind::ConnectionFailed));
    assert!(!result.verified);
    assert_eq!(result.confidence, 0.0);
    // three endpoints, each tried once more after the failure
    assert_eq!(connector.opened().len(), 6);
}

#[test]
fn regional_provider_reaches_its_exchangers_within_default_budget() {
    let config = Config {
        retry_delay_seconds: 0,
        ..Config::default()
    };
    let connector = FakeConnector::with("mx.zoho.com", FakeServer::accepting("ann@zoho.com"));
    let result = run(&config, "ann@zoho.com", &mx(&["mx.zoho.com"]), &connector);

    assert_eq!(result.existence, Existence::Exists);
    assert_eq!(result.server_used.as_deref(), Some("mx.zoho.com"));
    assert!(connector.opened().contains(&"mx.zoho.com:25".to_string()));
    assert!(result.servers_tried.len() <= config.max_servers);
}

#[test]
fn budget_keeps_order_and_reserves_exchange_slots() {
    let submission = |host: &str, port| EndpointCandidate::new(host, port, Transport::ExplicitTls);
    let exchange = |host: &str| EndpointCandidate::new(host, 25, Transport::Plain);
    let candidates = vec![
        submission("smtp.a", 587),
        submission("smtp.a", 465),
        submission("smtp.b", 587),
        submission("smtp.b", 465),
        exchange("mx.a"),
        exchange("mx.b"),
    ];

    let hosts = |budget| -> Vec<String> {
        within_budget(candidates.clone(), budget)
            .into_iter()
            .map(|c| format!("{}:{}", c.host, c.port))
            .collect()
    };
    assert_eq!(
        hosts(5),
        vec!["smtp.a:587", "smtp.a:465", "smtp.b:587", "mx.a:25", "mx.b:25"]
    );
    assert_eq!(hosts(1), vec!["smtp.a:587"]);
    assert_eq!(hosts(10).len(), 6);
}

#[test]
fn vrfy_acceptance_short_circuits_rcpt() {
    let config = test_config();
    let server = FakeServer {
        vrfy: (250, "Alice <alice@acme.org>"),
        ..FakeServer::default()
    };
    let connector = FakeConnector::with("mx1.acme.org", server);
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.method, Some(VerificationMethod::Vrfy));
    assert!((result.confidence - 0.95).abs() < 1e-5);
    assert!(!connector.commands().iter().any(|c| c.starts_with("RCPT")));
}

#[test]
fn vrfy_is_skipped_for_providers_that_disable_it() {
    let config = Config {
        max_servers: 1,
        ..test_config()
    };
    let server = FakeServer {
        capabilities: vec!["STARTTLS", "SIZE 35882577"],
        ..FakeServer::accepting("someone@gmail.com")
    };
    let connector = FakeConnector::with("smtp.gmail.com", server);
    let result = run(&config, "someone@gmail.com", &[], &connector);

    assert_eq!(result.existence, Existence::Exists);
    assert_eq!(result.port_used, Some(587));
    let commands = connector.commands();
    assert!(commands.contains(&"STARTTLS".to_string()));
    assert!(!commands.iter().any(|c| c.starts_with("VRFY")));
}

#[test]
fn starttls_endpoint_without_capability_is_inconclusive() {
    let config = Config {
        max_servers: 1,
        ..test_config()
    };
    let connector = FakeConnector::with("smtp.gmail.com", FakeServer::accepting("someone@gmail.com"));
    let result = run(&config, "someone@gmail.com", &[], &connector);

    assert_eq!(result.error, Some(ErrorKind::NoDetermination));
    assert!(result.error_detail.unwrap_or_default().contains("STARTTLS"));
}

#[test]
fn refused_null_sender_rotates_to_pool() {
    let config = Config {
        sender_pool: vec!["probe@sender.example".into()],
        ..test_config()
    };
    let mut server = FakeServer::accepting("alice@acme.org");
    server.senders.insert("", (550, "5.7.1 null sender not accepted"));
    let connector = FakeConnector::with("mx1.acme.org", server);
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::Exists);
    let commands = connector.commands();
    assert!(commands.contains(&"MAIL FROM:<probe@sender.example>".to_string()));
    assert!(commands.contains(&"RSET".to_string()));
}

#[test]
fn rejected_ehlo_falls_back_to_helo() {
    let config = test_config();
    let server = FakeServer {
        ehlo: (502, "5.5.2 EHLO not supported"),
        ..FakeServer::accepting("alice@acme.org")
    };
    let connector = FakeConnector::with("mx1.acme.org", server);
    let result = run(&config, "alice@acme.org", &mx(&["mx1.acme.org"]), &connector);

    assert_eq!(result.existence, Existence::Exists);
    assert!(connector.commands().iter().any(|c| c.starts_with("HELO ")));
}

#[test]
fn cancelled_token_stops_before_connecting() {
    let config = test_config();
    let cancel = CancelToken::new();
    cancel.cancel();
    let connector = FakeConnector::with("mx1.acme.org", FakeServer::accepting("alice@acme.org"));
    let target = Address::parse("alice@acme.org").expect("valid");
    let result = Verifier::new(&config)
        .with_cancel(cancel)
        .verify_with(&target, &mx(&["mx1.acme.org"]), &connector, Instant::now());

    assert_eq!(result.error, Some(ErrorKind::Cancelled));
    assert_eq!(result.existence, Existence::Cancelled);
    assert!(connector.opened().is_empty());
}

#[test]
fn invalid_syntax_skips_network() {
    let config = test_config();
    let result = Verifier::new(&config).verify("not-an-address");
    assert_eq!(result.error, Some(ErrorKind::SyntaxInvalid));
    assert!(result.servers_tried.is_empty());
    assert_eq!(result.confidence, 0.0);
}

fn spawn_mock_server(script: Vec<(&'static str, &'static str)>) -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().expect("addr").port();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        ready_tx.send(()).ok();
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = handle_session(&mut stream, script);
        }
    });
    ready_rx.recv().expect("server ready");
    (port, handle)
}

fn handle_session(stream: &mut TcpStream, script: Vec<(&'static str, &'static str)>) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    stream.write_all(b"220 mock.smtp.test ESMTP\r\n")?;
    stream.flush()?;
    for (expected, response) in script {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        assert!(
            line.starts_with(expected),
            "expected command starting with '{expected}', got '{line}'"
        );
        stream.write_all(response.as_bytes())?;
        stream.flush()?;
    }
    Ok(())
}

#[test]
#[ignore = "requires loopback TCP binding"]
fn verifies_over_loopback() {
    let (port, handle) = spawn_mock_server(vec![
        ("EHLO", "250-mock.example\r\n250 PIPELINING\r\n"),
        ("VRFY", "252 2.0.0 VRFY disabled\r\n"),
        ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
        ("RCPT TO:<user@example.com>", "250 2.1.5 Ok\r\n"),
        ("RCPT TO:", "550 5.1.1 User unknown\r\n"),
        ("RSET", "250 2.0.0 Reset\r\n"),
        ("QUIT", "221 2.0.0 Bye\r\n"),
    ]);
    let mut config = test_config();
    config.max_servers = 1;
    config.provider_overrides.insert(
        "example.com".into(),
        EndpointPreset {
            exchange: vec![EndpointCandidate::new("127.0.0.1", port, Transport::Plain)],
            ..EndpointPreset::default()
        },
    );
    let target = Address::parse("user@example.com").expect("valid");
    let result = Verifier::new(&config).verify_address(&target, &[]);

    assert_eq!(result.existence, Existence::Exists);
    assert_eq!(result.port_used, Some(port));
    assert!(result.transcript.iter().any(|line| line.contains("RCPT TO:<user@example.com>")));
    handle.join().expect("server thread");
}

fn any_existence() -> impl Strategy<Value = Existence> {
    prop_oneof![
        Just(Existence::Exists),
        Just(Existence::DoesNotExist),
        Just(Existence::CatchAll),
        Just(Existence::Ambiguous),
        Just(Existence::Indeterminate("timeout".into())),
        Just(Existence::Cancelled),
    ]
}

fn any_method() -> impl Strategy<Value = Option<VerificationMethod>> {
    prop::option::of(prop_oneof![
        Just(VerificationMethod::Vrfy),
        Just(VerificationMethod::Rcpt),
        Just(VerificationMethod::Expn),
    ])
}

fn any_weights() -> impl Strategy<Value = ConfidenceWeights> {
    let weight = || -2.0f32..5.0;
    (
        (weight(), weight(), weight(), weight(), weight()),
        (weight(), weight(), weight()),
        prop_oneof![Just(0.0f32), Just(1.0f32), 0.0f32..=1.0],
    )
        .prop_map(
            |(
                (connection, rejected, accepted, accepted_forwarded, ambiguous),
                (vrfy_bonus, rcpt_bonus, expn_bonus),
                catch_all_factor,
            )| ConfidenceWeights {
                connection,
                rejected,
                accepted,
                accepted_forwarded,
                ambiguous,
                vrfy_bonus,
                rcpt_bonus,
                expn_bonus,
                catch_all_factor,
            },
        )
}

proptest! {
    #[test]
    fn confidence_stays_within_unit_interval(
        existence in any_existence(),
        connected in any::<bool>(),
        code in prop::option::of(prop::sample::select(vec![250u16, 251, 252, 450, 550, 553])),
        method in any_method(),
        weights in any_weights(),
        cap in 0.0f32..=1.0,
    ) {
        let value = confidence(&existence, connected, code, method, &weights, cap);
        prop_assert!(value.is_finite());
        prop_assert!((0.0..=1.0).contains(&value), "confidence {value}");
        if existence == Existence::CatchAll {
            prop_assert!(value <= cap, "catch-all {value} above cap {cap}");
        }
    }

    #[test]
    fn default_weights_stay_within_unit_interval(
        existence in any_existence(),
        connected in any::<bool>(),
        code in prop::option::of(100u16..600),
        method in any_method(),
    ) {
        let weights = ConfidenceWeights::default();
        let value = confidence(&existence, connected, code, method, &weights, 0.6);
        prop_assert!((0.0..=1.0).contains(&value));
    }
}
