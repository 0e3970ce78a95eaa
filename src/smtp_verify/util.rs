use once_cell::sync::Lazy;
use rand::{Rng, distributions::Alphanumeric};
use regex::Regex;

use crate::config::ConfidenceWeights;
use crate::smtp_verify::session::SmtpReply;
use crate::smtp_verify::types::{Existence, VerificationMethod};

pub fn random_local_part(len: usize) -> String {
    let length = len.clamp(8, 32);
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Wording that makes a 5xx reply an explicit statement about the mailbox.
static UNKNOWN_USER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(user unknown|unknown user|no such (user|mailbox|recipient)|mailbox (not found|does not exist)|does not exist|not found|invalid (recipient|mailbox)|recipient unknown|5\.1\.1)",
    )
    .expect("static regex")
});

/// Wording of a server refusing the command rather than answering it.
static COMMAND_REFUSED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(disabled|not (allowed|permitted|implemented)|administrative|prohibited|policy|denied|refused)")
        .expect("static regex")
});

/// What a single VRFY/EXPN/RCPT reply says about the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Signal {
    Accepted(u16),
    Rejected(u16),
    Ambiguous(u16),
    /// Policy rejections, temporary failures and anything unexpected.
    Inconclusive(String),
}

pub(crate) fn classify_vrfy(reply: &SmtpReply) -> Signal {
    match reply.code {
        250 | 251 => Signal::Accepted(reply.code),
        252 => Signal::Ambiguous(252),
        550 | 551 | 553 if !COMMAND_REFUSED.is_match(&reply.text_lower()) => {
            Signal::Rejected(reply.code)
        }
        code => Signal::Inconclusive(format!("VRFY answered {code}")),
    }
}

pub(crate) fn classify_rcpt(reply: &SmtpReply) -> Signal {
    if reply.code == 252 {
        return Signal::Ambiguous(252);
    }
    if reply.is_positive_completion() {
        return Signal::Accepted(reply.code);
    }
    if reply.is_permanent_failure() {
        if UNKNOWN_USER.is_match(&reply.text_lower()) {
            return Signal::Rejected(reply.code);
        }
        return Signal::Inconclusive(format!("recipient refused by policy ({})", reply.code));
    }
    if reply.is_transient_failure() {
        return Signal::Inconclusive(format!("temporary failure {}", reply.code));
    }
    Signal::Inconclusive(format!("unexpected response {}", reply.code))
}

/// Certainty of `existence`, built from additive weights.
///
/// Catch-all verdicts are scaled down and capped; the result is always within
/// `[0, 1]`.
pub(crate) fn confidence(
    existence: &Existence,
    connected: bool,
    code: Option<u16>,
    method: Option<VerificationMethod>,
    weights: &ConfidenceWeights,
    catch_all_cap: f32,
) -> f32 {
    let mut score = if connected { weights.connection } else { 0.0 };

    score += match (existence, code) {
        (Existence::DoesNotExist, _) => weights.rejected,
        (Existence::Exists | Existence::CatchAll, Some(251)) => weights.accepted_forwarded,
        (Existence::Exists | Existence::CatchAll, _) => weights.accepted,
        (Existence::Ambiguous, _) => weights.ambiguous,
        _ => 0.0,
    };

    if existence.is_determined() {
        score += match method {
            Some(VerificationMethod::Vrfy) => weights.vrfy_bonus,
            Some(VerificationMethod::Rcpt) => weights.rcpt_bonus,
            Some(VerificationMethod::Expn) => weights.expn_bonus,
            None => 0.0,
        };
    }

    if *existence == Existence::CatchAll {
        score = (score * weights.catch_all_factor).min(catch_all_cap);
    }

    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
