//! Ordered pattern tables driving bounce, auto-reply and recipient detection.
//!
//! Each table is scanned top to bottom and the first matching rule wins, so
//! more specific patterns sit above broader ones.

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::BounceType;

pub(crate) struct Rule<V> {
    pub name: &'static str,
    pub pattern: Regex,
    pub verdict: V,
}

fn compile<V: Copy>(table: &[(&'static str, &'static str, V)]) -> Vec<Rule<V>> {
    table
        .iter()
        .map(|&(name, pattern, verdict)| Rule {
            name,
            pattern: Regex::new(pattern).expect("static regex"),
            verdict,
        })
        .collect()
}

pub(crate) fn first_match<'r, V>(rules: &'r [Rule<V>], text: &str) -> Option<&'r Rule<V>> {
    rules.iter().find(|rule| rule.pattern.is_match(text))
}

/// What a signal rule says about the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    /// Automated sender that is specifically a delivery subsystem.
    DeliverySubsystem,
    /// Automated sender of any other kind.
    Automated,
}

/// Matched against the lowercased sender address.
pub(crate) static SENDER_RULES: Lazy<Vec<Rule<Signal>>> = Lazy::new(|| {
    compile(&[
        (
            "mailer-daemon",
            r"^(mailer-daemon|mailer_daemon|mailerdaemon|mail-daemon|mail\.daemon)[+@]",
            Signal::DeliverySubsystem,
        ),
        ("postmaster", r"^postmaster[+@]", Signal::DeliverySubsystem),
        (
            "bounce-handler",
            r"^(bounces?|mail-?delivery|mdaemon|maildelivery)[+@-]",
            Signal::DeliverySubsystem,
        ),
        (
            "no-reply",
            r"^(no-?reply|do-?not-?reply|noreply-[a-z0-9]+)[+@]",
            Signal::Automated,
        ),
    ])
});

/// Matched against the sender display name.
pub(crate) static DISPLAY_NAME_RULES: Lazy<Vec<Rule<Signal>>> = Lazy::new(|| {
    compile(&[
        (
            "delivery-subsystem-name",
            r"(?i)mail delivery (subsystem|system|service)|mailer[- ]daemon|postmaster",
            Signal::DeliverySubsystem,
        ),
        (
            "delivery-status-name",
            r"(?i)delivery status notification|undeliverable mail",
            Signal::DeliverySubsystem,
        ),
    ])
});

/// Failure wording in subject or body. Plain "delay" notices never match here.
pub(crate) static FAILURE_RULES: Lazy<Vec<Rule<()>>> = Lazy::new(|| {
    compile(&[
        ("undeliverable", r"(?i)\bundeliver(able|ed)\b", ()),
        ("returned-mail", r"(?i)\breturned (mail|to sender)\b", ()),
        (
            "delivery-failed",
            r"(?i)\b(mail )?delivery (has )?(failed|failure)|delivery status notification \(failure\)|failure notice\b",
            (),
        ),
        (
            "not-delivered",
            r"(?i)\b(could not|couldn't|wasn't|was not|cannot) be delivered|message not delivered|delivery to the following recipients? failed",
            (),
        ),
        (
            "permanent-failure",
            r"(?i)\bpermanent (error|failure|fatal errors?)\b|address not found\b",
            (),
        ),
    ])
});

/// Delay wording anywhere in subject or body. Delay notices are informational
/// and never bounces unless a permanent signal is also present.
pub(crate) static DELAY_NOTICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)delivery status notification \(delay\)|will (keep|continue) (trying|to retry)|will be retried|still being retried|\bwarning only\b|^[ \t]*action:[ \t]*delayed\b",
    )
    .expect("static regex")
});

/// Bare "delay" wording, trusted in the subject only.
pub(crate) static DELAY_SUBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdelay(ed)?\b").expect("static regex"));

/// Signals that a delivery attempt has been given up for good.
pub(crate) static PERMANENT_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*action:[ \t]*failed\b|(?:^|[^\d.])5\.\d{1,3}\.\d{1,3}(?:[^\d.]|$)",
    )
    .expect("static regex")
});

/// Sub-type rules: phrases before enhanced status codes before bare reply codes.
pub(crate) static SUBTYPE_RULES: Lazy<Vec<Rule<BounceType>>> = Lazy::new(|| {
    compile(&[
        (
            "user-unknown",
            r"(?i)\b(user unknown|unknown user|no such user|unknown recipient|user not found)\b",
            BounceType::Hard,
        ),
        (
            "mailbox-missing",
            r"(?i)\bmailbox (not found|unavailable|does not exist|doesn't exist)|no mailbox here\b",
            BounceType::Hard,
        ),
        (
            "address-missing",
            r"(?i)\b(does not exist|doesn't exist|no such (address|recipient)|invalid (recipient|address|mailbox)|recipient (address )?rejected|account (has been )?disabled)\b",
            BounceType::Hard,
        ),
        (
            "quota",
            r"(?i)\b(over ?quota|quota exceeded|exceeded (the|its|their)? ?(storage|quota)|mailbox (is )?full|insufficient (storage|space))\b",
            BounceType::Soft,
        ),
        (
            "size",
            r"(?i)\b(message (is )?too (large|big)|exceeds (the )?(maximum|max) (message )?size|message size exceeds)\b",
            BounceType::Soft,
        ),
        (
            "greylist",
            r"(?i)\b(gr[ae]y ?list(ed|ing)?|try again later|temporar(y|ily) (failure|unavailable|rejected|deferred))\b",
            BounceType::Soft,
        ),
        ("permanent-status", r"\b5\.\d{1,3}\.\d{1,3}\b", BounceType::Hard),
        ("transient-status", r"\b4\.\d{1,3}\.\d{1,3}\b", BounceType::Soft),
        ("permanent-code", r"\b55[0-4]\b", BounceType::Hard),
        ("transient-code", r"\b4[25][0-9]\b", BounceType::Soft),
    ])
});

/// Out-of-office and vacation wording.
pub(crate) static AUTO_REPLY_RULES: Lazy<Vec<Rule<()>>> = Lazy::new(|| {
    compile(&[
        ("out-of-office", r"(?i)\bout of (the )?office\b|\booo\b", ()),
        (
            "vacation",
            r"(?i)\b(on vacation|on holiday|on (annual|parental|maternity|paternity)? ?leave|vacation (reply|notice|message))\b",
            (),
        ),
        (
            "automatic-reply",
            r"(?i)\b(automatic|auto)[- ]?(reply|response|responder)\b|\bautoreply\b",
            (),
        ),
        (
            "away",
            r"(?i)\b(i am|i'm) (currently )?(away|out)\b|\baway from (the office|my desk)\b|limited access to (e-?mail|my e-?mail)",
            (),
        ),
    ])
});

const ADDRESS: &str = r"[A-Za-z0-9._%+'-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}";

/// Recipient extraction strategies; group 1 is the address.
pub(crate) static RECIPIENT_RULES: Lazy<Vec<Rule<()>>> = Lazy::new(|| {
    let structured = format!(
        r"(?im)^[ \t]*(?:original|final)-recipient:[ \t]*(?:rfc822[ \t]*;[ \t]*)?<?({ADDRESS})"
    );
    let postfix = format!(r"(?i)\bto=<({ADDRESS})>");
    let received_for = format!(r"(?i)\bfor[ \t]+<?({ADDRESS})>?[ \t]*;");
    let generic = format!(r"({ADDRESS})");
    vec![
        ("recipient-header", structured),
        ("to-bracket", postfix),
        ("for-clause", received_for),
        ("generic", generic),
    ]
    .into_iter()
    .map(|(name, pattern)| Rule {
        name,
        pattern: Regex::new(&pattern).expect("static regex"),
        verdict: (),
    })
    .collect()
});
