use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MxStatus {
    Records(Vec<MxRecord>),
    NoRecords,
}

impl MxStatus {
    pub fn records(&self) -> &[MxRecord] {
        match self {
            Self::Records(records) => records.as_slice(),
            Self::NoRecords => &[],
        }
    }

    /// Exchange hostnames in preference order.
    pub fn hosts(&self) -> Vec<String> {
        self.records().iter().map(|r| r.exchange.clone()).collect()
    }
}

/// Outcome of the address-record check for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsStatus {
    /// At least one A/AAAA record.
    Address,
    /// No address record, but the zone is delegated (NS records).
    NameServersOnly,
    NoRecords,
}

impl DnsStatus {
    pub fn resolves(self) -> bool {
        !matches!(self, Self::NoRecords)
    }
}
