use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::smtp_verify::VerificationResult;

/// Points awarded by one check on unambiguous success.
pub const CHECK_WEIGHT: u8 = 25;

/// Per-check contributions; each is either 0 or [`CHECK_WEIGHT`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub regex: u8,
    pub dns: u8,
    pub mx: u8,
    pub smtp: u8,
}

impl Breakdown {
    pub fn total(&self) -> u8 {
        self.regex + self.dns + self.mx + self.smtp
    }

    pub(crate) fn award(passed: bool) -> u8 {
        if passed { CHECK_WEIGHT } else { 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub address: String,
    /// Sum of the breakdown, within `[0, 100]`.
    pub score: u8,
    pub breakdown: Breakdown,
    pub is_valid: bool,
    pub notes: Vec<String>,
    pub mx_hosts: Vec<String>,
    /// Absent when syntax failed.
    pub verification: Option<VerificationResult>,
    /// The first failure class that cost points, if any.
    pub error: Option<ErrorKind>,
}

impl ScoreResult {
    pub(crate) fn syntax_invalid(address: &str, reasons: Vec<String>) -> Self {
        Self {
            address: address.to_string(),
            score: 0,
            breakdown: Breakdown::default(),
            is_valid: false,
            notes: reasons
                .into_iter()
                .map(|reason| format!("syntax: {reason}"))
                .collect(),
            mx_hosts: Vec::new(),
            verification: None,
            error: Some(ErrorKind::SyntaxInvalid),
        }
    }
}
