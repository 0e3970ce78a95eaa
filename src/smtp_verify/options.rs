use std::borrow::Cow;
use std::time::Duration;

use crate::config::{ConfidenceWeights, Config};

/// Knobs of one verification run, derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierOptions {
    pub helo_domain: Option<String>,
    pub sender_pool: Vec<String>,
    pub timeout: Duration,
    pub max_servers: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub catch_all_probes: u8,
    pub use_vrfy: bool,
    pub use_expn: bool,
    pub accept_invalid_certs: bool,
    pub confidence_threshold: f32,
    pub catch_all_cap: f32,
    pub weights: ConfidenceWeights,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for VerifierOptions {
    fn from(config: &Config) -> Self {
        Self {
            helo_domain: config.helo_domain.clone(),
            sender_pool: config.sender_pool.clone(),
            timeout: config.timeout(),
            max_servers: config.max_servers,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            catch_all_probes: config.catch_all_probes.min(5),
            use_vrfy: config.use_vrfy,
            use_expn: config.use_expn,
            accept_invalid_certs: config.accept_invalid_certs,
            confidence_threshold: config.thresholds.confidence_threshold,
            catch_all_cap: config.thresholds.catch_all_confidence_cap,
            weights: config.thresholds.weights.clone(),
        }
    }
}

impl VerifierOptions {
    pub fn helo_name<'a>(&'a self, fallback: &'a str) -> Cow<'a, str> {
        match self.helo_domain.as_deref().map(str::trim) {
            Some(helo) if !helo.is_empty() => Cow::Borrowed(helo),
            _ => Cow::Borrowed(fallback),
        }
    }

    /// Envelope senders in the order they are offered: the null sender, the
    /// configured pool, then `postmaster@<helo>`.
    pub fn envelope_senders(&self, helo: &str) -> Vec<String> {
        let mut senders = vec![String::new()];
        for sender in &self.sender_pool {
            let sender = sender.trim();
            if !sender.is_empty() && !senders.iter().any(|s| s == sender) {
                senders.push(sender.to_string());
            }
        }
        let postmaster = format!("postmaster@{helo}");
        if !senders.contains(&postmaster) {
            senders.push(postmaster);
        }
        senders
    }
}
