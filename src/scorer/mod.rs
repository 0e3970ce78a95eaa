//! Multi-Method Validation Scorer: syntax, DNS, MX and SMTP checks worth 25
//! points each, combined into a 0–100 score and an admit/reject decision.

mod types;

pub use types::{Breakdown, CHECK_WEIGHT, ScoreResult};

use tracing::{debug, info, warn};

use crate::batch::CancelToken;
use crate::config::Config;
use crate::dns::{self, DnsLookup, MxStatus};
use crate::error::ErrorKind;
use crate::smtp_verify::{Existence, VerificationResult, Verifier};
use crate::validator::{Address, ValidationMode, validate_email};

/// Scores with default configuration.
pub fn score(address: &str) -> ScoreResult {
    Scorer::new(&Config::default()).score(address)
}

pub struct Scorer<'a> {
    config: &'a Config,
    cancel: CancelToken,
}

impl<'a> Scorer<'a> {
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

    pub fn score(&self, address: &str) -> ScoreResult {
        let target = match parse(address) {
            Ok(target) => target,
            Err(result) => return result,
        };
        if self.cancel.is_cancelled() {
            let breakdown = Breakdown {
                regex: CHECK_WEIGHT,
                ..Breakdown::default()
            };
            return ScoreResult {
                address: address.to_string(),
                score: breakdown.total(),
                breakdown,
                is_valid: false,
                notes: vec!["scoring cancelled".to_string()],
                mx_hosts: Vec::new(),
                verification: None,
                error: Some(ErrorKind::Cancelled),
            };
        }
        let verifier = Verifier::new(self.config).with_cancel(self.cancel.clone());
        let verify = |target: &Address, mx: &[String]| verifier.verify_address(target, mx);

        match dns::system_resolver(self.config.timeout()) {
            Ok(resolver) => self.score_with(address, &target, &resolver, verify),
            Err(err) => {
                warn!(target: "mailprobe::scorer", error = %err, "resolver unavailable");
                let verification = verify(&target, &[]);
                let mut result = self.combine(address, false, false, Vec::new(), verification);
                result.notes.insert(0, format!("dns: resolver unavailable: {err}"));
                result
            }
        }
    }

    /// Runs the three network checks against `resolver` and `verify`.
    pub(crate) fn score_with<R, V>(
        &self,
        address: &str,
        target: &Address,
        resolver: &R,
        verify: V,
    ) -> ScoreResult
    where
        R: DnsLookup + ?Sized,
        V: FnOnce(&Address, &[String]) -> VerificationResult,
    {
        let domain = target.ascii_domain.as_str();
        let mut notes = Vec::new();

        let dns_ok = match dns::resolve_dns_with(resolver, domain) {
            Ok(status) if status.resolves() => true,
            Ok(_) => {
                notes.push(format!("dns: {domain} has no address or name-server records"));
                false
            }
            Err(err) => {
                notes.push(format!("dns: {err}"));
                false
            }
        };

        let mx_hosts = match dns::resolve_mx_with(resolver, domain) {
            Ok(status @ MxStatus::Records(_)) => status.hosts(),
            Ok(MxStatus::NoRecords) => {
                notes.push(format!("mx: {domain} publishes no mail exchanger"));
                Vec::new()
            }
            Err(err) => {
                notes.push(format!("mx: {err}"));
                Vec::new()
            }
        };
        let mx_ok = !mx_hosts.is_empty();
        debug!(target: "mailprobe::scorer", %domain, dns_ok, mx_ok, "resolution checks done");

        let verification = verify(target, &mx_hosts);
        let mut result = self.combine(address, dns_ok, mx_ok, mx_hosts, verification);
        notes.append(&mut result.notes);
        result.notes = notes;
        info!(
            target: "mailprobe::scorer",
            address = %result.address,
            score = result.score,
            is_valid = result.is_valid,
            "scored"
        );
        result
    }

    fn combine(
        &self,
        address: &str,
        dns_ok: bool,
        mx_ok: bool,
        mx_hosts: Vec<String>,
        verification: VerificationResult,
    ) -> ScoreResult {
        let smtp_ok = definite_acceptance(&verification);
        let breakdown = Breakdown {
            regex: Breakdown::award(true),
            dns: Breakdown::award(dns_ok),
            mx: Breakdown::award(mx_ok),
            smtp: Breakdown::award(smtp_ok),
        };
        let score = breakdown.total();

        let mut notes = Vec::new();
        let rejected = verification.is_rejected();
        let ambiguous =
            verification.smtp_code == Some(252) || verification.existence == Existence::Ambiguous;
        if rejected {
            notes.push(format!(
                "smtp: mailbox rejected ({})",
                verification.smtp_code.unwrap_or_default()
            ));
        } else if verification.catch_all_detected {
            notes.push("smtp: domain accepts any local part".to_string());
        } else if ambiguous {
            notes.push("smtp: server declined to confirm the mailbox".to_string());
        } else if !smtp_ok {
            if let Some(detail) = &verification.error_detail {
                notes.push(format!("smtp: {detail}"));
            }
        }

        let is_valid = score >= self.config.thresholds.valid_score_threshold
            && !rejected
            && !ambiguous
            && !verification.catch_all_detected;

        let error = if !dns_ok || !mx_ok {
            Some(ErrorKind::ResolutionFailed)
        } else {
            verification.error
        };

        ScoreResult {
            address: address.to_string(),
            score,
            breakdown,
            is_valid,
            notes,
            mx_hosts,
            verification: Some(verification),
            error,
        }
    }
}

fn parse(address: &str) -> Result<Address, ScoreResult> {
    let report = validate_email(address, ValidationMode::Strict);
    if !report.ok {
        return Err(ScoreResult::syntax_invalid(address, report.reasons));
    }
    Address::parse(address).map_err(|err| ScoreResult::syntax_invalid(address, err.reasons()))
}

/// 250/251 on a determined, non-catch-all acceptance.
fn definite_acceptance(verification: &VerificationResult) -> bool {
    verification.existence == Existence::Exists
        && !verification.catch_all_detected
        && matches!(verification.smtp_code, Some(250 | 251))
}

#[cfg(test)]
mod tests;
