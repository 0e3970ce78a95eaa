#![forbid(unsafe_code)]
//! mailprobe_lib — deliverability checks for e-mail addresses: syntax, DNS/MX,
//! SMTP existence probing, scoring, provider-aware sending and mailbox
//! classification.

pub mod validator;
pub use validator::{
    Address, EmailError, NormalizedEmail, ValidationMode, ValidationReport, normalize_email,
    validate_email,
};

pub mod error;
pub use error::ErrorKind;

pub mod resolver;
pub use resolver::{
    EndpointCandidate, EndpointPreset, EndpointResolver, Provider, Purpose, Resolution, Transport,
    resolve_endpoints,
};

pub mod dns;
pub use dns::{DnsError, DnsStatus, MxRecord, MxStatus, check_dns, check_mx};

pub mod config;
pub use config::{Config, ConfigError, ConfidenceWeights, Thresholds};

pub mod smtp_verify;
pub use smtp_verify::{
    Existence, SmtpVerifyError, VerificationMethod, VerificationResult, Verifier, verify,
};

pub mod scorer;
pub use scorer::{Breakdown, ScoreResult, Scorer, score};

pub mod delivery;
pub use delivery::{
    DeliveryError, EndpointAttempt, Router, SendAttempt, SendOutcome, SmtpCredentials, send,
};

pub mod mailbox;
pub use mailbox::{
    BounceType, EventKind, InboundMessage, MailboxCredentials, MailboxError, MailboxEvent,
    ScanOutcome, Scanner, classify_message, extract_recipient, scan_mailbox,
};

pub mod batch;
pub use batch::{CancelToken, Progress, ProgressSnapshot, score_batch, verify_batch};
