//! DNS checks for the scorer and the verifier: address records (with NS
//! fallback) and MX records, synchronous, through the system resolver.

mod error;
mod resolver;
mod types;

pub use error::DnsError;
pub use resolver::{check_dns, check_mx};
pub use types::{DnsStatus, MxRecord, MxStatus};

pub(crate) use resolver::{DnsLookup, resolve_dns_with, resolve_mx_with, system_resolver};
