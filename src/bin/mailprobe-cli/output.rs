use anyhow::{Context, Result, bail};
use serde::Serialize;

use mailprobe_lib::{
    NormalizedEmail, Resolution, ScanOutcome, ScoreResult, SendOutcome, ValidationMode,
    VerificationResult,
};

use crate::args::Cli;

/// One printable row of a command's report.
pub trait Report: Serialize {
    fn human_lines(&self) -> Vec<String>;

    #[cfg_attr(not(feature = "with-csv"), allow(dead_code))]
    fn csv_record(&self) -> Vec<String>;

    /// Counts towards exit code 2 when false.
    fn is_ok(&self) -> bool;
}

pub fn write_reports<R: Report>(rows: &[R], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => {
            for row in rows {
                for line in row.human_lines() {
                    println!("{line}");
                }
            }
            Ok(())
        }
        "json" => {
            let s = serde_json::to_string_pretty(rows)?;
            emit(cli, s.into_bytes())
        }
        "ndjson" => {
            let mut buf = Vec::new();
            for row in rows {
                buf.extend_from_slice(serde_json::to_string(row)?.as_bytes());
                buf.push(b'\n');
            }
            emit(cli, buf)
        }
        "csv" => write_csv(rows, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn any_failed<R: Report>(rows: &[R]) -> bool {
    rows.iter().any(|row| !row.is_ok())
}

fn emit(cli: &Cli, bytes: Vec<u8>) -> Result<()> {
    match &cli.out {
        Some(path) => write_all_atomically(path, &bytes),
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes)?;
            if !bytes.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}

#[cfg(feature = "with-csv")]
fn write_csv<R: Report>(rows: &[R], cli: &Cli) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.write_record(row.csv_record())?;
    }
    let data = wtr.into_inner().context("flush csv")?;
    emit(cli, data)
}

#[cfg(not(feature = "with-csv"))]
fn write_csv<R: Report>(_: &[R], _: &Cli) -> Result<()> {
    bail!("format=csv requires the 'with-csv' feature")
}

fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl Report for NormalizedEmail {
    fn human_lines(&self) -> Vec<String> {
        if self.valid {
            vec![format!("[OK]    {}", self.original)]
        } else {
            vec![format!("[INVALID] {} :: {}", self.original, self.reasons.join("; "))]
        }
    }

    fn csv_record(&self) -> Vec<String> {
        vec![
            self.original.clone(),
            self.local.clone(),
            self.domain.clone(),
            self.ascii_domain.clone(),
            match self.mode {
                ValidationMode::Strict => "strict",
                ValidationMode::Relaxed => "relaxed",
            }
            .to_string(),
            self.valid.to_string(),
            self.reasons.join("|"),
        ]
    }

    fn is_ok(&self) -> bool {
        self.valid
    }
}

impl Report for Resolution {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("provider: {} ({:?})", self.provider, self.purpose)];
        lines.extend(self.candidates.iter().map(|c| format!("  {c}")));
        lines
    }

    fn csv_record(&self) -> Vec<String> {
        vec![
            self.provider.to_string(),
            self.candidates
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("|"),
        ]
    }

    fn is_ok(&self) -> bool {
        !self.candidates.is_empty()
    }
}

/// Verification plus whether to print the transcript.
#[derive(Serialize)]
#[serde(transparent)]
pub struct VerifyRow {
    pub result: VerificationResult,
    #[serde(skip)]
    pub transcript: bool,
}

impl Report for VerifyRow {
    fn human_lines(&self) -> Vec<String> {
        let r = &self.result;
        let tag = if r.verified && r.deliverable {
            "[OK]"
        } else if r.verified {
            "[INVALID]"
        } else {
            "[UNKNOWN]"
        };
        let mut lines = vec![format!(
            "{tag} {} :: {:?} (confidence {:.2}, provider {})",
            r.address, r.existence, r.confidence, r.provider
        )];
        if let (Some(server), Some(port)) = (&r.server_used, r.port_used) {
            lines.push(format!(
                "        server: {server}:{port} code {} via {}",
                opt(r.smtp_code),
                r.method.map(|m| format!("{m:?}")).unwrap_or_default()
            ));
        }
        if let Some(kind) = r.error {
            lines.push(format!(
                "        error: {kind}: {}",
                r.error_detail.as_deref().unwrap_or("")
            ));
        }
        if !r.servers_tried.is_empty() {
            lines.push(format!("        tried: {}", r.servers_tried.join(", ")));
        }
        if self.transcript {
            lines.extend(r.transcript.iter().map(|line| format!("        {line}")));
        }
        lines
    }

    fn csv_record(&self) -> Vec<String> {
        let r = &self.result;
        vec![
            r.address.clone(),
            r.verified.to_string(),
            r.deliverable.to_string(),
            format!("{:.2}", r.confidence),
            format!("{:?}", r.existence),
            opt(r.smtp_code),
            opt(r.server_used.as_deref()),
            opt(r.error),
        ]
    }

    fn is_ok(&self) -> bool {
        self.result.verified && self.result.deliverable
    }
}

impl Report for ScoreResult {
    fn human_lines(&self) -> Vec<String> {
        let tag = if self.is_valid { "[OK]" } else { "[INVALID]" };
        let b = &self.breakdown;
        let mut lines = vec![format!(
            "{tag} {} :: score {}/100 (regex {}, dns {}, mx {}, smtp {})",
            self.address, self.score, b.regex, b.dns, b.mx, b.smtp
        )];
        lines.extend(self.notes.iter().map(|n| format!("        {n}")));
        lines
    }

    fn csv_record(&self) -> Vec<String> {
        vec![
            self.address.clone(),
            self.score.to_string(),
            self.is_valid.to_string(),
            self.breakdown.regex.to_string(),
            self.breakdown.dns.to_string(),
            self.breakdown.mx.to_string(),
            self.breakdown.smtp.to_string(),
            opt(self.error),
            self.notes.join("|"),
        ]
    }

    fn is_ok(&self) -> bool {
        self.is_valid
    }
}

impl Report for SendOutcome {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match (&self.endpoint_used, self.success) {
            (Some(endpoint), true) => lines.push(format!("[SENT] via {endpoint} ({})", self.provider)),
            _ => lines.push(format!(
                "[FAILED] {}: {}",
                opt(self.error_kind),
                self.error_detail.as_deref().unwrap_or("")
            )),
        }
        if let Some(hint) = &self.remediation {
            lines.push(format!("        hint: {hint}"));
        }
        for attempt in &self.attempts {
            let status = match &attempt.error_kind {
                None => "ok".to_string(),
                Some(kind) => kind.to_string(),
            };
            lines.push(format!("        {} -> {status}", attempt.endpoint));
        }
        lines
    }

    fn csv_record(&self) -> Vec<String> {
        vec![
            self.success.to_string(),
            self.provider.to_string(),
            opt(self.endpoint_used.as_ref()),
            opt(self.error_kind),
            opt(self.error_detail.as_deref()),
        ]
    }

    fn is_ok(&self) -> bool {
        self.success
    }
}

impl Report for ScanOutcome {
    fn human_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(kind) = self.error_kind {
            lines.push(format!(
                "[FAILED] {kind}: {}",
                self.error_detail.as_deref().unwrap_or("")
            ));
            if self.endpoint_used.is_none() {
                return lines;
            }
        }
        lines.push(format!(
            "scanned {} message(s) via {}, {} event(s)",
            self.scanned,
            opt(self.endpoint_used.as_ref()),
            self.events.len()
        ));
        for event in &self.events {
            let kind = match event.bounce_type {
                Some(bounce) => format!("{}/{bounce}", event.kind),
                None => event.kind.to_string(),
            };
            let recipient = event
                .recipient_extracted
                .as_deref()
                .map(|r| format!(" -> {r}"))
                .unwrap_or_default();
            lines.push(format!("  [{kind}] {} :: {}{recipient}", event.sender, event.subject));
        }
        lines
    }

    fn csv_record(&self) -> Vec<String> {
        let events = self
            .events
            .iter()
            .map(|event| {
                format!(
                    "{}:{}:{}:{}",
                    event.kind,
                    opt(event.bounce_type),
                    event.sender,
                    opt(event.recipient_extracted.as_deref())
                )
            })
            .collect::<Vec<_>>()
            .join("|");
        vec![
            self.scanned.to_string(),
            opt(self.endpoint_used.as_ref()),
            opt(self.error_kind),
            events,
        ]
    }

    fn is_ok(&self) -> bool {
        self.error_kind.is_none()
    }
}
