//! Address syntax: RFC-oriented checks on the local part and domain.
//!
//! Every other stage of the pipeline starts from an [`Address`]; an input
//! that does not parse short-circuits all network work.

mod domain;
mod local;
mod types;

pub use types::{Address, EmailError, NormalizedEmail, ValidationMode, ValidationReport};

use domain::{check_domain, normalize_domain};
use local::check_local;

const TOTAL_MAX: usize = 254;

pub fn validate_email(email: &str, mode: ValidationMode) -> ValidationReport {
    let input = email.trim();

    let mut reasons = Vec::new();

    if input.len() > TOTAL_MAX {
        reasons.push(format!("total length {} > {TOTAL_MAX}", input.len()));
    }

    let Some((local, domain)) = split_address(input) else {
        reasons.push("must contain exactly one '@'".to_string());
        return ValidationReport { ok: false, reasons };
    };

    check_local(local, mode, &mut reasons);
    check_domain(domain, &mut reasons);

    let ok = reasons.is_empty();
    ValidationReport { ok, reasons }
}

/// Valide et renvoie une *sortie normalisée*
/// (local, domaine normalisé, domaine ASCII).
pub fn normalize_email(email: &str, mode: ValidationMode) -> NormalizedEmail {
    let input = email.trim();
    let (local, domain) = input.split_once('@').unwrap_or(("", ""));

    let ValidationReport { ok, reasons } = validate_email(email, mode);
    let (domain_lower, ascii_domain) = normalize_domain(domain);

    NormalizedEmail {
        original: email.to_string(),
        local: local.to_string(),
        domain: domain_lower,
        ascii_domain,
        mode,
        valid: ok,
        reasons,
    }
}

impl Address {
    /// Parses `email` with strict local-part rules.
    pub fn parse(email: &str) -> Result<Self, EmailError> {
        Self::parse_with_mode(email, ValidationMode::Strict)
    }

    pub fn parse_with_mode(email: &str, mode: ValidationMode) -> Result<Self, EmailError> {
        let normalized = normalize_email(email, mode);
        if !normalized.valid {
            return Err(EmailError::invalid(normalized.reasons));
        }
        if normalized.ascii_domain.is_empty() {
            return Err(EmailError::invalid(vec![
                "domain missing after normalisation".to_string(),
            ]));
        }
        Ok(Self {
            local_part: normalized.local,
            domain: normalized.domain,
            ascii_domain: normalized.ascii_domain,
        })
    }
}

impl std::str::FromStr for Address {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_address(input: &str) -> Option<(&str, &str)> {
    let mut parts = input.split('@');
    let local = parts.next()?;
    let domain = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((local, domain))
}
