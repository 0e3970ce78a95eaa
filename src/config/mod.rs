//! Configuration surface shared by every component.
//!
//! Defaults mirror the tuned constants of the pipeline; a TOML file may override
//! any of them. Unknown keys are rejected.

mod error;

pub use error::ConfigError;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resolver::{EndpointPreset, EndpointResolver};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Connect/read/write timeout for every network operation.
    pub timeout_seconds: u64,
    /// Extra attempts per endpoint after a connection failure.
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_concurrent_verifications: usize,
    /// Upper bound on endpoints tried by one verification.
    pub max_servers: usize,
    /// Cap for synthesized endpoints of unrecognised domains.
    pub max_generic_candidates: usize,
    /// EHLO identity; the target domain is used when unset.
    pub helo_domain: Option<String>,
    /// MAIL FROM addresses tried after the null sender.
    pub sender_pool: Vec<String>,
    pub catch_all_probes: u8,
    pub use_vrfy: bool,
    pub use_expn: bool,
    pub accept_invalid_certs: bool,
    /// Messages fetched when a mailbox has nothing unseen.
    pub scan_limit: usize,
    pub thresholds: Thresholds,
    pub provider_overrides: HashMap<String, EndpointPreset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            max_retries: 1,
            retry_delay_seconds: 1,
            max_concurrent_verifications: 4,
            max_servers: 5,
            max_generic_candidates: crate::resolver::DEFAULT_MAX_GENERIC,
            helo_domain: None,
            sender_pool: Vec::new(),
            catch_all_probes: 1,
            use_vrfy: true,
            use_expn: false,
            accept_invalid_certs: false,
            scan_limit: 20,
            thresholds: Thresholds::default(),
            provider_overrides: HashMap::new(),
        }
    }
}

/// Score and confidence cut-offs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Minimum confidence for `verified = true`.
    pub confidence_threshold: f32,
    /// Minimum score for `is_valid = true`.
    pub valid_score_threshold: u8,
    pub catch_all_confidence_cap: f32,
    pub weights: ConfidenceWeights,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            valid_score_threshold: 75,
            catch_all_confidence_cap: 0.6,
            weights: ConfidenceWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfidenceWeights {
    pub connection: f32,
    pub rejected: f32,
    pub accepted: f32,
    pub accepted_forwarded: f32,
    pub ambiguous: f32,
    pub vrfy_bonus: f32,
    pub rcpt_bonus: f32,
    pub expn_bonus: f32,
    pub catch_all_factor: f32,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            connection: 0.2,
            rejected: 0.7,
            accepted: 0.6,
            accepted_forwarded: 0.5,
            ambiguous: 0.1,
            vrfy_bonus: 0.15,
            rcpt_bonus: 0.1,
            expn_bonus: 0.1,
            catch_all_factor: 0.5,
        }
    }
}

impl Config {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::invalid("timeout_seconds", "must be > 0"));
        }
        if self.max_concurrent_verifications == 0 {
            return Err(ConfigError::invalid(
                "max_concurrent_verifications",
                "must be > 0",
            ));
        }
        if self.max_servers == 0 {
            return Err(ConfigError::invalid("max_servers", "must be > 0"));
        }
        if self.max_generic_candidates == 0 {
            return Err(ConfigError::invalid("max_generic_candidates", "must be > 0"));
        }
        if self.catch_all_probes > 5 {
            return Err(ConfigError::invalid("catch_all_probes", "must be <= 5"));
        }
        let t = &self.thresholds;
        for (field, value) in [
            ("thresholds.confidence_threshold", t.confidence_threshold),
            ("thresholds.catch_all_confidence_cap", t.catch_all_confidence_cap),
            ("thresholds.weights.catch_all_factor", t.weights.catch_all_factor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be within [0, 1]"));
            }
        }
        if t.valid_score_threshold > 100 {
            return Err(ConfigError::invalid(
                "thresholds.valid_score_threshold",
                "must be <= 100",
            ));
        }
        for (domain, preset) in &self.provider_overrides {
            let field = format!("provider_overrides.{domain}");
            if preset.is_empty() {
                return Err(ConfigError::invalid(field, "preset has no endpoints"));
            }
            let all = preset
                .exchange
                .iter()
                .chain(&preset.submission)
                .chain(&preset.mailbox);
            for candidate in all {
                if candidate.host.trim().is_empty() || candidate.port == 0 {
                    return Err(ConfigError::invalid(
                        field,
                        format!("bad endpoint '{candidate}'"),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn endpoint_resolver(&self) -> EndpointResolver<'_> {
        EndpointResolver::new(&self.provider_overrides, self.max_generic_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Transport;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().expect("defaults validate");
    }

    #[test]
    fn parses_partial_toml_with_overrides() {
        let config = Config::from_toml_str(
            r#"
            timeout_seconds = 5
            max_concurrent_verifications = 2

            [thresholds]
            valid_score_threshold = 50

            [[provider_overrides."corp.example".submission]]
            host = "relay.corp.example"
            port = 2525
            transport = "plain"
            "#,
        )
        .expect("valid config");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.thresholds.valid_score_threshold, 50);
        assert!((config.thresholds.confidence_threshold - 0.7).abs() < f32::EPSILON);
        let preset = &config.provider_overrides["corp.example"];
        assert_eq!(preset.submission[0].transport, Transport::Plain);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = Config::from_toml_str("timeout = 5").expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = Config::from_toml_str("timeout_seconds = 0").expect_err("zero timeout");
        assert!(err.to_string().contains("timeout_seconds"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.thresholds.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
