use std::time::Duration;

use trust_dns_resolver::{
    Resolver,
    error::{ResolveError, ResolveErrorKind},
    system_conf::read_system_conf,
};

use super::{DnsError, DnsStatus, MxRecord, MxStatus};

/// Lookup MX records for `domain` using the system resolver.
///
/// The domain is normalized via IDNA before querying DNS. The resulting
/// [`MxStatus`] contains the sorted list of records (ascending preference).
pub fn check_mx(domain: &str) -> Result<MxStatus, DnsError> {
    let ascii = normalize_domain(domain)?;
    let resolver = system_resolver(DEFAULT_TIMEOUT)?;
    resolve_mx_with(&resolver, &ascii)
}

/// Checks that `domain` has an address record, falling back to NS records.
pub fn check_dns(domain: &str) -> Result<DnsStatus, DnsError> {
    let ascii = normalize_domain(domain)?;
    let resolver = system_resolver(DEFAULT_TIMEOUT)?;
    resolve_dns_with(&resolver, &ascii)
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// System resolver with an explicit per-query timeout.
pub(crate) fn system_resolver(timeout: Duration) -> Result<Resolver, DnsError> {
    let (config, mut opts) = read_system_conf().map_err(DnsError::resolver_init)?;
    opts.timeout = timeout;
    opts.attempts = 2;
    Resolver::new(config, opts).map_err(DnsError::resolver_init)
}

pub(crate) fn resolve_mx_with<R>(resolver: &R, ascii_domain: &str) -> Result<MxStatus, DnsError>
where
    R: DnsLookup + ?Sized,
{
    let mut records = match resolver.lookup_mx(ascii_domain) {
        Ok(records) => records,
        Err(err) if is_empty_answer(&err) => Vec::new(),
        Err(err) => return Err(DnsError::lookup("MX", ascii_domain, err)),
    };

    records.sort();
    records.dedup();
    // RFC 7505 null MX: the domain explicitly accepts no mail.
    records.retain(|r| !r.exchange.is_empty());

    if records.is_empty() {
        Ok(MxStatus::NoRecords)
    } else {
        Ok(MxStatus::Records(records))
    }
}

pub(crate) fn resolve_dns_with<R>(resolver: &R, ascii_domain: &str) -> Result<DnsStatus, DnsError>
where
    R: DnsLookup + ?Sized,
{
    match resolver.has_address(ascii_domain) {
        Ok(true) => return Ok(DnsStatus::Address),
        Ok(false) => {}
        Err(err) if is_empty_answer(&err) => {}
        Err(err) => return Err(DnsError::lookup("A/AAAA", ascii_domain, err)),
    }
    match resolver.has_name_servers(ascii_domain) {
        Ok(true) => Ok(DnsStatus::NameServersOnly),
        Ok(false) => Ok(DnsStatus::NoRecords),
        Err(err) if is_empty_answer(&err) => Ok(DnsStatus::NoRecords),
        Err(err) => Err(DnsError::lookup("NS", ascii_domain, err)),
    }
}

pub(crate) fn normalize_domain(domain: &str) -> Result<String, DnsError> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        return Err(DnsError::EmptyDomain);
    }
    idna::domain_to_ascii(trimmed).map_err(DnsError::idna)
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}

fn is_empty_answer(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// The DNS queries the pipeline needs. Implemented by the system resolver and by
/// test stubs.
pub(crate) trait DnsLookup {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError>;
    fn has_address(&self, domain: &str) -> Result<bool, ResolveError>;
    fn has_name_servers(&self, domain: &str) -> Result<bool, ResolveError>;
}

impl DnsLookup for Resolver {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let lookup = Resolver::mx_lookup(self, domain)?;
        let mut records = Vec::new();
        for mx in lookup.iter() {
            let exchange = normalize_exchange(mx.exchange().to_utf8());
            records.push(MxRecord::new(mx.preference(), exchange));
        }
        Ok(records)
    }

    fn has_address(&self, domain: &str) -> Result<bool, ResolveError> {
        let lookup = Resolver::lookup_ip(self, domain)?;
        Ok(lookup.iter().next().is_some())
    }

    fn has_name_servers(&self, domain: &str) -> Result<bool, ResolveError> {
        let lookup = Resolver::ns_lookup(self, domain)?;
        Ok(lookup.iter().next().is_some())
    }
}
