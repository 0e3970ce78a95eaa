//! Endpoint Resolver: derives ordered `(host, port, transport)` candidates for a
//! domain. Pure data derivation, no network I/O; MX hostnames, when known, are
//! passed in by the caller.

mod provider;
mod types;

pub use provider::Provider;
pub use types::{EndpointCandidate, EndpointPreset, Purpose, Resolution, Transport};

use std::collections::{HashMap, HashSet};

/// Default cap for synthesized candidates of unrecognised domains.
pub const DEFAULT_MAX_GENERIC: usize = 6;

/// Hosted Exchange endpoints tried last for unknown domains.
const HOSTED_EXCHANGE_SMTP: &str = "smtp.office365.com";
const HOSTED_EXCHANGE_IMAP: &str = "outlook.office365.com";

#[derive(Debug, Clone)]
pub struct EndpointResolver<'a> {
    overrides: Option<&'a HashMap<String, EndpointPreset>>,
    max_generic: usize,
}

impl Default for EndpointResolver<'_> {
    fn default() -> Self {
        Self {
            overrides: None,
            max_generic: DEFAULT_MAX_GENERIC,
        }
    }
}

impl<'a> EndpointResolver<'a> {
    pub fn new(overrides: &'a HashMap<String, EndpointPreset>, max_generic: usize) -> Self {
        Self {
            overrides: Some(overrides),
            max_generic: max_generic.max(1),
        }
    }

    pub fn resolve(&self, domain: &str, hint: Option<Provider>, purpose: Purpose) -> Resolution {
        self.resolve_with_mx(domain, hint, purpose, &[])
    }

    /// Same as [`resolve`](Self::resolve), with MX hostnames (preference order)
    /// used both to recognise hosted providers and as port-25 exchange candidates.
    pub fn resolve_with_mx(
        &self,
        domain: &str,
        hint: Option<Provider>,
        purpose: Purpose,
        mx_hosts: &[String],
    ) -> Resolution {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        let provider = identify(&domain, hint, mx_hosts);

        let mut candidates = Vec::new();
        if let Some(preset) = self.overrides.and_then(|o| o.get(&domain)) {
            candidates.extend_from_slice(preset.for_purpose(purpose));
        }

        if provider.is_known() {
            candidates.extend(provider.preset(&domain, purpose));
            if purpose == Purpose::Exchange {
                candidates.extend(mx_candidates(mx_hosts));
            }
        } else {
            let mut generic = Vec::new();
            if purpose == Purpose::Exchange {
                generic.extend(mx_candidates(mx_hosts));
            }
            generic.extend(generic_candidates(&domain, purpose));
            let mut generic = dedup(generic);
            generic.truncate(self.max_generic);
            candidates.extend(generic);
        }

        Resolution {
            provider,
            purpose,
            candidates: dedup(candidates),
        }
    }
}

/// Resolves with the built-in table only.
pub fn resolve_endpoints(domain: &str, hint: Option<Provider>, purpose: Purpose) -> Resolution {
    EndpointResolver::default().resolve(domain, hint, purpose)
}

fn identify(domain: &str, hint: Option<Provider>, mx_hosts: &[String]) -> Provider {
    if let Some(provider) = hint.filter(|p| p.is_known()) {
        return provider;
    }
    let by_domain = Provider::from_domain(domain);
    if by_domain.is_known() {
        return by_domain;
    }
    mx_hosts
        .iter()
        .map(|host| Provider::from_mx_host(host))
        .find(|p| p.is_known())
        .unwrap_or(Provider::Unknown)
}

fn mx_candidates(mx_hosts: &[String]) -> impl Iterator<Item = EndpointCandidate> + '_ {
    mx_hosts
        .iter()
        .map(|host| host.trim_end_matches('.'))
        .filter(|host| !host.is_empty())
        .map(|host| EndpointCandidate::new(host, 25, Transport::Plain))
}

fn generic_candidates(domain: &str, purpose: Purpose) -> Vec<EndpointCandidate> {
    use Transport::{ExplicitTls, ImplicitTls, Plain};
    let host = |prefix: &str| {
        if prefix.is_empty() {
            domain.to_string()
        } else {
            format!("{prefix}.{domain}")
        }
    };
    match purpose {
        Purpose::Exchange => vec![
            EndpointCandidate::new(host("mail"), 25, Plain),
            EndpointCandidate::new(host("smtp"), 25, Plain),
            EndpointCandidate::new(host("mx"), 25, Plain),
            EndpointCandidate::new(host(""), 25, Plain),
            EndpointCandidate::new(HOSTED_EXCHANGE_SMTP, 587, ExplicitTls),
        ],
        Purpose::Submission => vec![
            EndpointCandidate::new(host("smtp"), 587, ExplicitTls),
            EndpointCandidate::new(host("smtp"), 465, ImplicitTls),
            EndpointCandidate::new(host("mail"), 587, ExplicitTls),
            EndpointCandidate::new(host("mail"), 465, ImplicitTls),
            EndpointCandidate::new(host(""), 587, ExplicitTls),
            EndpointCandidate::new(HOSTED_EXCHANGE_SMTP, 587, ExplicitTls),
        ],
        Purpose::Mailbox => vec![
            EndpointCandidate::new(host("imap"), 993, ImplicitTls),
            EndpointCandidate::new(host("mail"), 993, ImplicitTls),
            EndpointCandidate::new(host("imap"), 143, ExplicitTls),
            EndpointCandidate::new(host(""), 993, ImplicitTls),
            EndpointCandidate::new(HOSTED_EXCHANGE_IMAP, 993, ImplicitTls),
        ],
    }
}

/// Drops repeated `(host, port)` pairs, keeping the first occurrence.
fn dedup(candidates: Vec<EndpointCandidate>) -> Vec<EndpointCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

#[cfg(test)]
mod tests;
