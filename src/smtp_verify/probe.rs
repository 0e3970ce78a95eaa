use tracing::debug;

use crate::batch::CancelToken;
use crate::resolver::{EndpointCandidate, Provider, Transport};
use crate::smtp_verify::error::SmtpVerifyError;
use crate::smtp_verify::options::VerifierOptions;
use crate::smtp_verify::session::SmtpChannel;
use crate::smtp_verify::types::{Existence, VerificationMethod};
use crate::smtp_verify::util::{Signal, classify_rcpt, classify_vrfy};
use crate::validator::Address;

/// Everything a single session needs to know about the target.
pub(crate) struct ProbeContext<'a> {
    pub target: &'a Address,
    pub options: &'a VerifierOptions,
    pub provider: Provider,
    pub catch_all_locals: &'a [String],
    pub cancel: &'a CancelToken,
}

impl ProbeContext<'_> {
    fn checkpoint(&self) -> Result<(), SmtpVerifyError> {
        if self.cancel.is_cancelled() {
            Err(SmtpVerifyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome of one SMTP session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionReport {
    pub existence: Existence,
    pub code: Option<u16>,
    pub method: Option<VerificationMethod>,
    pub catch_all: bool,
    pub checks: u32,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            existence: Existence::Indeterminate("session ended early".to_string()),
            code: None,
            method: None,
            catch_all: false,
            checks: 0,
        }
    }

    fn conclude(mut self, existence: Existence, code: u16, method: VerificationMethod) -> Self {
        self.existence = existence;
        self.code = Some(code);
        self.method = Some(method);
        self
    }

    fn inconclusive(mut self, code: Option<u16>, reason: impl Into<String>) -> Self {
        self.existence = Existence::Indeterminate(reason.into());
        if code.is_some() {
            self.code = code;
        }
        self
    }

    fn ambiguous(mut self, code: u16, method: VerificationMethod) -> Self {
        self.existence = Existence::Ambiguous;
        self.code = Some(code);
        self.method = Some(method);
        self
    }
}

/// Runs banner, EHLO, optional STARTTLS, VRFY/EXPN, MAIL/RCPT and the catch-all
/// probe on an open channel. QUIT is left to the caller.
pub(crate) fn run_dialogue(
    channel: &mut dyn SmtpChannel,
    endpoint: &EndpointCandidate,
    ctx: &ProbeContext<'_>,
) -> Result<SessionReport, SmtpVerifyError> {
    let mut report = SessionReport::new();
    let target = ctx.target;

    let banner = channel.read_banner()?;
    if banner.code == 521 {
        return Ok(report.inconclusive(Some(521), "server does not receive mail"));
    }
    if !banner.is_positive_completion() {
        return Ok(report.inconclusive(
            Some(banner.code),
            format!("greeting refused with {}", banner.code),
        ));
    }

    ctx.checkpoint()?;
    let helo = ctx.options.helo_name(&target.ascii_domain).into_owned();
    let mut ehlo = channel.send_command(&format!("EHLO {helo}"))?;
    if !ehlo.is_positive_completion() {
        ehlo = channel.send_command(&format!("HELO {helo}"))?;
        if !ehlo.is_positive_completion() {
            return Ok(report.inconclusive(
                Some(ehlo.code),
                format!("HELO rejected with {}", ehlo.code),
            ));
        }
    }

    if endpoint.transport == Transport::ExplicitTls {
        if !ehlo.has_capability("STARTTLS") {
            return Ok(report.inconclusive(
                None,
                SmtpVerifyError::StartTlsUnavailable {
                    host: endpoint.host.clone(),
                }
                .to_string(),
            ));
        }
        ctx.checkpoint()?;
        let tls_reply = channel.starttls()?;
        if !tls_reply.is_positive_completion() {
            return Ok(report.inconclusive(
                Some(tls_reply.code),
                format!("STARTTLS rejected with {}", tls_reply.code),
            ));
        }
        ehlo = channel.send_command(&format!("EHLO {helo}"))?;
        if !ehlo.is_positive_completion() {
            return Ok(report.inconclusive(
                Some(ehlo.code),
                format!("EHLO after STARTTLS rejected with {}", ehlo.code),
            ));
        }
    }

    let mut ambiguous: Option<(u16, VerificationMethod)> = None;

    if ctx.options.use_vrfy && !ctx.provider.disables_vrfy() {
        ctx.checkpoint()?;
        let reply = channel.send_command(&format!("VRFY {}", target.local_part))?;
        report.checks += 1;
        match classify_vrfy(&reply) {
            Signal::Accepted(code) => {
                return Ok(report.conclude(Existence::Exists, code, VerificationMethod::Vrfy));
            }
            Signal::Rejected(code) => {
                return Ok(report.conclude(Existence::DoesNotExist, code, VerificationMethod::Vrfy));
            }
            Signal::Ambiguous(code) => ambiguous = Some((code, VerificationMethod::Vrfy)),
            Signal::Inconclusive(reason) => {
                debug!(target: "mailprobe::smtp_verify", %reason, "VRFY inconclusive");
            }
        }
    }

    if ctx.options.use_expn && ehlo.has_capability("EXPN") {
        ctx.checkpoint()?;
        let reply = channel.send_command(&format!("EXPN {}", target.local_part))?;
        report.checks += 1;
        match classify_vrfy(&reply) {
            Signal::Accepted(code) => {
                return Ok(report.conclude(Existence::Exists, code, VerificationMethod::Expn));
            }
            Signal::Rejected(code) => {
                return Ok(report.conclude(Existence::DoesNotExist, code, VerificationMethod::Expn));
            }
            Signal::Ambiguous(code) => ambiguous = Some((code, VerificationMethod::Expn)),
            Signal::Inconclusive(_) => {}
        }
    }

    let mut sender_accepted = false;
    let mut last_sender_code = None;
    for sender in ctx.options.envelope_senders(&helo) {
        ctx.checkpoint()?;
        let reply = channel.send_command(&format!("MAIL FROM:<{sender}>"))?;
        if reply.is_positive_completion() {
            sender_accepted = true;
            break;
        }
        last_sender_code = Some(reply.code);
        channel.send_command("RSET")?;
    }
    if !sender_accepted {
        return Ok(report.inconclusive(last_sender_code, "every envelope sender was refused"));
    }

    ctx.checkpoint()?;
    let reply = channel.send_command(&format!("RCPT TO:<{}>", target.wire()))?;
    report.checks += 1;
    let accepted_code = match classify_rcpt(&reply) {
        Signal::Accepted(code) => code,
        Signal::Rejected(code) => {
            return Ok(report.conclude(Existence::DoesNotExist, code, VerificationMethod::Rcpt));
        }
        Signal::Ambiguous(code) => return Ok(report.ambiguous(code, VerificationMethod::Rcpt)),
        Signal::Inconclusive(reason) => {
            return Ok(match ambiguous {
                Some((code, method)) => report.ambiguous(code, method),
                None => report.inconclusive(Some(reply.code), reason),
            });
        }
    };

    let mut catch_all = false;
    for alias in ctx.catch_all_locals {
        if alias.eq_ignore_ascii_case(&target.local_part) {
            continue;
        }
        ctx.checkpoint()?;
        let probe = channel.send_command(&format!("RCPT TO:<{alias}@{}>", target.ascii_domain))?;
        report.checks += 1;
        if probe.is_positive_completion() {
            catch_all = true;
            break;
        }
    }
    // best effort: the transaction is abandoned either way
    channel.send_command("RSET").ok();

    report.catch_all = catch_all;
    let existence = if catch_all {
        Existence::CatchAll
    } else {
        Existence::Exists
    };
    Ok(report.conclude(existence, accepted_code, VerificationMethod::Rcpt))
}
