//! SMTP Existence Verifier.
//!
//! [`Verifier::verify`] walks an ordered list of endpoints (MX hosts first),
//! runs a minimal SMTP dialogue on each and stops at the first session that
//! determines existence. Network conditions never surface as `Err`; they are
//! folded into the returned [`VerificationResult`].

mod error;
mod options;
mod probe;
mod session;
mod types;
mod util;

pub use error::SmtpVerifyError;
pub use options::VerifierOptions;
pub use types::{Existence, VerificationMethod, VerificationResult};

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::batch::CancelToken;
use crate::config::Config;
use crate::dns::{self, DnsLookup, MxStatus};
use crate::error::ErrorKind;
use crate::resolver::{EndpointCandidate, Provider, Purpose};
use crate::validator::Address;

use probe::{ProbeContext, run_dialogue};
use session::{Connector, TcpConnector};
use util::{confidence, random_local_part};

/// Verifies with default configuration.
pub fn verify(address: &str) -> VerificationResult {
    Verifier::new(&Config::default()).verify(address)
}

pub struct Verifier<'a> {
    config: &'a Config,
    options: VerifierOptions,
    cancel: CancelToken,
}

impl<'a> Verifier<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            options: VerifierOptions::from(config),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Parses `address`, looks up MX records and probes the candidates.
    pub fn verify(&self, address: &str) -> VerificationResult {
        let started = Instant::now();
        let target = match Address::parse(address) {
            Ok(target) => target,
            Err(err) => {
                return VerificationResult::failed(
                    address,
                    Provider::Unknown,
                    ErrorKind::SyntaxInvalid,
                    err.to_string(),
                    started.elapsed(),
                );
            }
        };
        if self.cancel.is_cancelled() {
            return VerificationResult::failed(
                address,
                Provider::Unknown,
                ErrorKind::Cancelled,
                "verification cancelled",
                started.elapsed(),
            );
        }
        let mx_hosts = match dns::system_resolver(self.options.timeout) {
            Ok(resolver) => lookup_mx_hosts(&resolver, &target.ascii_domain),
            Err(err) => {
                warn!(target: "mailprobe::smtp_verify", error = %err, "resolver unavailable");
                Vec::new()
            }
        };
        self.verify_address(&target, &mx_hosts)
    }

    /// Probes an already parsed address with known MX hostnames.
    pub fn verify_address(&self, target: &Address, mx_hosts: &[String]) -> VerificationResult {
        let started = Instant::now();
        match TcpConnector::new(self.options.timeout, self.options.accept_invalid_certs) {
            Ok(connector) => self.verify_with(target, mx_hosts, &connector, started),
            Err(err) => VerificationResult::failed(
                &target.to_string(),
                Provider::Unknown,
                ErrorKind::ConnectionFailed,
                err.to_string(),
                started.elapsed(),
            ),
        }
    }

    pub(crate) fn verify_with<C>(
        &self,
        target: &Address,
        mx_hosts: &[String],
        connector: &C,
        started: Instant,
    ) -> VerificationResult
    where
        C: Connector + ?Sized,
    {
        let address = target.to_string();
        let resolution = self.config.endpoint_resolver().resolve_with_mx(
            &target.ascii_domain,
            None,
            Purpose::Exchange,
            mx_hosts,
        );
        let provider = resolution.provider;
        let endpoints = within_budget(resolution.candidates, self.options.max_servers);

        if endpoints.is_empty() {
            return VerificationResult::failed(
                &address,
                provider,
                ErrorKind::ResolutionFailed,
                "no SMTP endpoints for domain",
                started.elapsed(),
            );
        }

        let catch_all_locals: Vec<String> = (0..self.options.catch_all_probes)
            .map(|_| random_local_part(target.local_part.len() + 4))
            .collect();
        let ctx = ProbeContext {
            target,
            options: &self.options,
            provider,
            catch_all_locals: &catch_all_locals,
            cancel: &self.cancel,
        };

        let mut walk = Walk::default();
        for attempt in plan_attempts(&endpoints, self.options.max_retries) {
            if self.cancel.is_cancelled() {
                return walk.finish_cancelled(&address, provider, started.elapsed());
            }
            let key = attempt.endpoint.dedup_key();
            if attempt.retry > 0 {
                if walk.settled.contains(&key) {
                    continue;
                }
                if !self.options.retry_delay.is_zero() {
                    std::thread::sleep(self.options.retry_delay);
                }
            }

            let endpoint = attempt.endpoint;
            debug!(
                target: "mailprobe::smtp_verify",
                endpoint = %endpoint,
                retry = attempt.retry,
                "opening session"
            );
            if attempt.retry == 0 {
                walk.servers_tried.push(endpoint.to_string());
            }

            let mut channel = match connector.open(endpoint) {
                Ok(channel) => channel,
                Err(err) => {
                    debug!(
                        target: "mailprobe::smtp_verify",
                        endpoint = %endpoint,
                        error = %err,
                        "connect failed"
                    );
                    walk.transcript.push(format!("[{}] ! {err}", endpoint.host));
                    walk.last_failure = Some((ErrorKind::ConnectionFailed, err.to_string()));
                    continue;
                }
            };
            walk.connected = true;
            let outcome = run_dialogue(channel.as_mut(), endpoint, &ctx);
            channel.quit();
            walk.transcript.extend(channel.take_transcript());

            match outcome {
                Ok(report) => {
                    walk.checks += report.checks;
                    walk.settled.insert(key);
                    if report.existence.is_determined() {
                        let result =
                            self.conclude(&address, provider, endpoint, report, walk, started);
                        info!(
                            target: "mailprobe::smtp_verify",
                            address = %result.address,
                            existence = %result.existence,
                            confidence = result.confidence,
                            "verification determined"
                        );
                        return result;
                    }
                    walk.observe(endpoint, report);
                }
                Err(SmtpVerifyError::Cancelled) => {
                    return walk.finish_cancelled(&address, provider, started.elapsed());
                }
                Err(err) if err.is_connection() => {
                    walk.transcript.push(format!("[{}] ! {err}", endpoint.host));
                    walk.last_failure = Some((ErrorKind::ConnectionFailed, err.to_string()));
                }
                Err(err) => {
                    walk.settled.insert(key);
                    walk.transcript.push(format!("[{}] ! {err}", endpoint.host));
                    walk.last_failure = Some((ErrorKind::ProtocolError, err.to_string()));
                }
            }
        }

        let result = walk.finish_undetermined(&address, provider, &self.options, started.elapsed());
        info!(
            target: "mailprobe::smtp_verify",
            address = %result.address,
            error = ?result.error,
            "verification undetermined"
        );
        result
    }

    fn conclude(
        &self,
        address: &str,
        provider: Provider,
        endpoint: &EndpointCandidate,
        report: probe::SessionReport,
        walk: Walk,
        started: Instant,
    ) -> VerificationResult {
        let value = confidence(
            &report.existence,
            true,
            report.code,
            report.method,
            &self.options.weights,
            self.options.catch_all_cap,
        );
        let accepted = matches!(report.existence, Existence::Exists | Existence::CatchAll);
        let (error, error_detail) = if report.existence == Existence::CatchAll {
            (
                Some(ErrorKind::CatchAllDetected),
                Some(format!("{} accepts any local part", endpoint.host)),
            )
        } else {
            (None, None)
        };
        VerificationResult {
            address: address.to_string(),
            verified: value >= self.options.confidence_threshold,
            deliverable: accepted,
            confidence: value,
            existence: report.existence,
            smtp_code: report.code,
            method: report.method,
            server_used: Some(endpoint.host.clone()),
            port_used: Some(endpoint.port),
            catch_all_detected: report.catch_all,
            checks_performed: walk.checks,
            provider,
            servers_tried: walk.servers_tried,
            duration: started.elapsed(),
            error,
            error_detail,
            transcript: walk.transcript,
        }
    }
}

/// One entry of the explicit attempt list.
struct Attempt<'e> {
    endpoint: &'e EndpointCandidate,
    retry: u32,
}

/// Each endpoint followed by its retries, in candidate order. Retries are
/// skipped at run time once the endpoint answered.
/// Takes at most `budget` endpoints in order, holding back half of the budget
/// for port-25 exchangers.
fn within_budget(candidates: Vec<EndpointCandidate>, budget: usize) -> Vec<EndpointCandidate> {
    let exchangers = candidates.iter().filter(|c| c.port == 25).count();
    let mut submission_slots = budget - exchangers.min(budget / 2);
    candidates
        .into_iter()
        .filter(|candidate| {
            if candidate.port == 25 {
                return true;
            }
            if submission_slots == 0 {
                return false;
            }
            submission_slots -= 1;
            true
        })
        .take(budget)
        .collect()
}

fn plan_attempts(endpoints: &[EndpointCandidate], max_retries: u32) -> Vec<Attempt<'_>> {
    endpoints
        .iter()
        .flat_map(|endpoint| (0..=max_retries).map(move |retry| Attempt { endpoint, retry }))
        .collect()
}

/// State carried across sessions of one verification.
#[derive(Default)]
struct Walk {
    connected: bool,
    checks: u32,
    servers_tried: Vec<String>,
    transcript: Vec<String>,
    settled: HashSet<(String, u16)>,
    /// Last non-committal answer: code, method and the endpoint that gave it.
    ambiguous: Option<(u16, Option<VerificationMethod>, String, u16)>,
    last_reason: Option<(Option<u16>, String)>,
    last_failure: Option<(ErrorKind, String)>,
}

impl Walk {
    fn observe(&mut self, endpoint: &EndpointCandidate, report: probe::SessionReport) {
        match report.existence {
            Existence::Ambiguous => {
                self.ambiguous = Some((
                    report.code.unwrap_or(252),
                    report.method,
                    endpoint.host.clone(),
                    endpoint.port,
                ));
            }
            Existence::Indeterminate(reason) => {
                self.last_reason = Some((report.code, format!("{}: {reason}", endpoint.host)));
            }
            _ => {}
        }
    }

    fn finish_cancelled(self, address: &str, provider: Provider, elapsed: Duration) -> VerificationResult {
        let mut result = VerificationResult::failed(
            address,
            provider,
            ErrorKind::Cancelled,
            "verification cancelled",
            elapsed,
        );
        result.checks_performed = self.checks;
        result.servers_tried = self.servers_tried;
        result.transcript = self.transcript;
        result
    }

    fn finish_undetermined(
        self,
        address: &str,
        provider: Provider,
        options: &VerifierOptions,
        elapsed: Duration,
    ) -> VerificationResult {
        let (existence, error, detail, code, method, server) = if let Some((code, method, host, port)) =
            self.ambiguous
        {
            (
                Existence::Ambiguous,
                ErrorKind::AmbiguousProtocolResponse,
                format!("{host} answered {code} without committing"),
                Some(code),
                method,
                Some((host, port)),
            )
        } else if let Some((code, reason)) = self.last_reason {
            (
                Existence::Indeterminate(reason.clone()),
                ErrorKind::NoDetermination,
                format!("no determination: {reason}"),
                code,
                None,
                None,
            )
        } else {
            let (kind, reason) = self
                .last_failure
                .unwrap_or((ErrorKind::NoDetermination, "no endpoint answered".to_string()));
            (
                Existence::Indeterminate(reason.clone()),
                kind,
                reason,
                None,
                None,
                None,
            )
        };

        let value = confidence(
            &existence,
            self.connected,
            code,
            method,
            &options.weights,
            options.catch_all_cap,
        );
        VerificationResult {
            address: address.to_string(),
            verified: false,
            deliverable: false,
            confidence: value,
            existence,
            smtp_code: code,
            method,
            server_used: server.as_ref().map(|(host, _)| host.clone()),
            port_used: server.map(|(_, port)| port),
            catch_all_detected: false,
            checks_performed: self.checks,
            provider,
            servers_tried: self.servers_tried,
            duration: elapsed,
            error: Some(error),
            error_detail: Some(detail),
            transcript: self.transcript,
        }
    }
}

/// MX hostnames in preference order; lookup failures yield an empty list so the
/// resolver falls back to synthesized candidates.
pub(crate) fn lookup_mx_hosts<R>(resolver: &R, ascii_domain: &str) -> Vec<String>
where
    R: DnsLookup + ?Sized,
{
    match dns::resolve_mx_with(resolver, ascii_domain) {
        Ok(status @ MxStatus::Records(_)) => status.hosts(),
        Ok(MxStatus::NoRecords) => Vec::new(),
        Err(err) => {
            debug!(target: "mailprobe::smtp_verify", error = %err, "MX lookup failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests;
