use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::error::MailboxError;
use super::rules::{self, Signal};
use super::types::{BounceType, EventKind, MailboxEvent};

const EXCERPT_CHARS: usize = 400;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));

/// The parts of a fetched message the classifier looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Lowercased address from `From:`.
    pub sender: String,
    pub display_name: Option<String>,
    pub subject: String,
    /// Decoded text of every textual part, delivery-status reports included.
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    /// `Auto-Submitted`, `X-Autoreply` or `Precedence: auto_reply` was present.
    pub auto_submitted: bool,
}

impl InboundMessage {
    pub fn parse(raw: &[u8]) -> Result<Self, MailboxError> {
        let parsed = mailparse::parse_mail(raw).map_err(|source| MailboxError::Parse { source })?;
        let headers = &parsed.headers;

        let (sender, display_name) = headers
            .get_first_value("From")
            .map(|from| parse_from(&from))
            .unwrap_or_default();
        let timestamp = headers
            .get_first_value("Date")
            .and_then(|date| mailparse::dateparse(&date).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        let auto_submitted = headers
            .get_first_value("Auto-Submitted")
            .is_some_and(|v| !v.trim().eq_ignore_ascii_case("no"))
            || headers.get_first_value("X-Autoreply").is_some()
            || headers.get_first_value("X-Autorespond").is_some()
            || headers
                .get_first_value("Precedence")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("auto_reply"));

        let mut body = String::new();
        collect_text(&parsed, &mut body);
        if body.trim().is_empty() {
            collect_html(&parsed, &mut body);
        }

        Ok(Self {
            sender,
            display_name,
            subject: headers.get_first_value("Subject").unwrap_or_default(),
            body,
            timestamp,
            message_id: headers
                .get_first_value("Message-ID")
                .map(|id| id.trim().to_string()),
            auto_submitted,
        })
    }
}

fn parse_from(from: &str) -> (String, Option<String>) {
    let first = mailparse::addrparse(from)
        .ok()
        .and_then(|list| list.iter().next().cloned());
    match first {
        Some(MailAddr::Single(info)) => (info.addr.to_ascii_lowercase(), info.display_name),
        Some(MailAddr::Group(group)) => (
            group
                .addrs
                .first()
                .map(|info| info.addr.to_ascii_lowercase())
                .unwrap_or_default(),
            Some(group.group_name),
        ),
        None => (from.trim().trim_matches(['<', '>']).to_ascii_lowercase(), None),
    }
}

fn collect_text(part: &ParsedMail<'_>, out: &mut String) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_text(sub, out);
        }
        return;
    }
    let mime = part.ctype.mimetype.to_ascii_lowercase();
    if mime == "text/plain" || mime.starts_with("message/") {
        if let Ok(text) = part.get_body() {
            out.push_str(&text);
            out.push('\n');
        }
    }
}

fn collect_html(part: &ParsedMail<'_>, out: &mut String) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_html(sub, out);
        }
        return;
    }
    if part.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        if let Ok(html) = part.get_body() {
            out.push_str(&HTML_TAG.replace_all(&html, " "));
            out.push('\n');
        }
    }
}

fn in_set(sent_to: &HashSet<String>, address: &str) -> bool {
    sent_to
        .iter()
        .any(|sent| sent.trim().eq_ignore_ascii_case(address))
}

/// Classifies one message, or returns `None` when it is neither a bounce nor
/// from an address in `sent_to`.
pub fn classify_message(message: &InboundMessage, sent_to: &HashSet<String>) -> Option<MailboxEvent> {
    let sender = message.sender.to_ascii_lowercase();
    let text = format!("{}\n{}", message.subject, message.body);

    let by_sender = rules::first_match(&rules::SENDER_RULES, &sender);
    let by_name = message
        .display_name
        .as_deref()
        .and_then(|name| rules::first_match(&rules::DISPLAY_NAME_RULES, name));
    let failure = rules::first_match(&rules::FAILURE_RULES, &text);
    let delayed =
        rules::DELAY_SUBJECT.is_match(&message.subject) || rules::DELAY_NOTICE.is_match(&text);
    let delay_only = delayed && !rules::PERMANENT_FAILURE.is_match(&text);

    let is_bounce =
        !delay_only && (failure.is_some() || by_sender.is_some() || by_name.is_some());
    if is_bounce {
        let subsystem = by_sender
            .into_iter()
            .chain(by_name)
            .any(|rule| rule.verdict == Signal::DeliverySubsystem);
        let bounce_type = match rules::first_match(&rules::SUBTYPE_RULES, &text) {
            Some(rule) => {
                debug!(target: "mailprobe::mailbox", rule = rule.name, "bounce sub-type");
                rule.verdict
            }
            None if subsystem => BounceType::Hard,
            None => BounceType::Unknown,
        };
        let exclude = [sender.as_str()];
        return Some(event(
            message,
            EventKind::Bounce,
            Some(bounce_type),
            extract_recipient(&message.body, sent_to, &exclude),
        ));
    }

    if delay_only {
        debug!(target: "mailprobe::mailbox", sender = %sender, "delay notice ignored");
    }
    if !in_set(sent_to, &sender) {
        return None;
    }
    let auto = message.auto_submitted
        || rules::first_match(&rules::AUTO_REPLY_RULES, &text).is_some();
    let kind = if auto { EventKind::AutoReply } else { EventKind::Reply };
    Some(event(message, kind, None, None))
}

fn event(
    message: &InboundMessage,
    kind: EventKind,
    bounce_type: Option<BounceType>,
    recipient_extracted: Option<String>,
) -> MailboxEvent {
    MailboxEvent {
        kind,
        bounce_type,
        sender: message.sender.clone(),
        subject: message.subject.clone(),
        recipient_extracted,
        body_excerpt: excerpt(&message.body),
        timestamp: message.timestamp,
        message_id: message.message_id.clone(),
    }
}

fn excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(EXCERPT_CHARS).collect()
}

/// Pulls the original recipient out of bounce text.
///
/// Strategies run in order (recipient report lines, `to=<...>`, `for ...;`,
/// any address). The first candidate found in `sent_to` wins; otherwise the
/// first candidate overall. Addresses in `exclude` are never returned.
pub fn extract_recipient(body: &str, sent_to: &HashSet<String>, exclude: &[&str]) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();
    for rule in rules::RECIPIENT_RULES.iter() {
        for caps in rule.pattern.captures_iter(body) {
            let Some(found) = caps.get(1) else { continue };
            let address = found.as_str().trim_end_matches('.').to_ascii_lowercase();
            if exclude.iter().any(|e| e.eq_ignore_ascii_case(&address)) {
                continue;
            }
            if !candidates.contains(&address) {
                candidates.push(address);
            }
        }
    }
    candidates
        .iter()
        .find(|candidate| in_set(sent_to, candidate))
        .or_else(|| candidates.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(addresses: &[&str]) -> HashSet<String> {
        addresses.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn recipient_report_line_beats_generic_addresses() {
        let body = "From: postmaster@mx.example.com\n\
                    Final-Recipient: rfc822;alice@example.com\n\
                    Action: failed\n";
        assert_eq!(
            extract_recipient(body, &HashSet::new(), &["postmaster@mx.example.com"]).as_deref(),
            Some("alice@example.com")
        );
    }

    #[test]
    fn sent_to_intersection_is_preferred() {
        let body = "<carol@example.net>: host mx said 550\nto=<bob@example.org>";
        let sent = set(&["Carol@Example.net"]);
        assert_eq!(extract_recipient(body, &sent, &[]).as_deref(), Some("carol@example.net"));
        assert_eq!(
            extract_recipient(body, &HashSet::new(), &[]).as_deref(),
            Some("bob@example.org")
        );
    }

    #[test]
    fn for_clause_strategy() {
        let body = "Received: by mx.example.com for <dave@example.com>; Mon, 1 Jan 2024";
        assert_eq!(
            extract_recipient(body, &HashSet::new(), &[]).as_deref(),
            Some("dave@example.com")
        );
    }

    #[test]
    fn no_address_yields_none() {
        assert_eq!(extract_recipient("nothing to see", &HashSet::new(), &[]), None);
    }

    #[test]
    fn parse_reads_headers_and_multipart_text() {
        let raw = b"From: \"Mail Delivery Subsystem\" <MAILER-DAEMON@mx.example.com>\r\n\
Subject: Undelivered Mail Returned to Sender\r\n\
Date: Mon, 01 Jan 2024 10:00:00 +0000\r\n\
Message-ID: <abc@mx.example.com>\r\n\
Content-Type: multipart/report; report-type=delivery-status; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
\r\n\
The mail system could not deliver your message.\r\n\
--b1\r\n\
Content-Type: message/delivery-status\r\n\
\r\n\
Final-Recipient: rfc822;alice@example.com\r\n\
Status: 5.1.1\r\n\
--b1--\r\n";
        let message = InboundMessage::parse(raw).expect("parse");
        assert_eq!(message.sender, "mailer-daemon@mx.example.com");
        assert_eq!(message.display_name.as_deref(), Some("Mail Delivery Subsystem"));
        assert_eq!(message.message_id.as_deref(), Some("<abc@mx.example.com>"));
        assert_eq!(
            message.timestamp.map(|t| t.timestamp()),
            Some(1_704_103_200)
        );
        assert!(message.body.contains("could not deliver"));
        assert!(message.body.contains("Final-Recipient: rfc822;alice@example.com"));
    }

    #[test]
    fn html_only_bodies_are_stripped() {
        let raw = b"From: bob@example.org\r\nSubject: hi\r\nContent-Type: text/html\r\n\r\n<p>See <b>you</b> soon</p>\r\n";
        let message = InboundMessage::parse(raw).expect("parse");
        assert!(message.body.contains("See"));
        assert!(!message.body.contains("<b>"));
    }
}
