use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use mailprobe_lib::{Config, Provider, Purpose, ValidationMode};

#[derive(Parser)]
#[command(name = "mailprobe-cli", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// format: human|json|ndjson|csv
    #[arg(long, global = true, default_value = "human")]
    pub format: String,

    /// write report to file (JSON/NDJSON/CSV per --format)
    #[arg(long, global = true)]
    pub out: Option<String>,

    /// -v for info, -vv for debug (logs go to stderr)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Syntax check only, no network
    Validate {
        /// mode: strict|relaxed
        #[arg(long, default_value = "strict")]
        mode: String,
        /// addresses; read from stdin when empty
        emails: Vec<String>,
    },
    /// List the endpoints that would be tried for a domain
    Endpoints {
        domain: String,
        /// purpose: exchange|submission|mailbox
        #[arg(long, default_value = "exchange")]
        purpose: String,
        /// force a provider (gmail, outlook, zoho, ...)
        #[arg(long)]
        provider: Option<String>,
    },
    /// SMTP existence probe
    Verify {
        email: String,
        /// print the SMTP transcript (human format)
        #[arg(long)]
        transcript: bool,
    },
    /// Syntax, DNS, MX and SMTP score out of 100
    Score { email: String },
    /// Verify (or score) addresses from stdin with a bounded worker pool
    Batch {
        /// score instead of verify
        #[arg(long)]
        score: bool,
        /// overrides max_concurrent_verifications
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Send one message through the sender's provider
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "")]
        subject: String,
        /// message body; read from stdin when absent
        #[arg(long)]
        body: Option<String>,
        /// login name, defaults to --from
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Classify unseen mailbox messages as replies, auto-replies or bounces
    Scan {
        account: String,
        /// address we sent to (repeatable)
        #[arg(long = "sent-to")]
        sent_to: Vec<String>,
        #[arg(long)]
        provider: Option<String>,
    },
}

pub const PASSWORD_ENV: &str = "MAILPROBE_PASSWORD";

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => Config::default(),
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

pub fn mode_from_str(s: &str) -> ValidationMode {
    match s {
        "relaxed" => ValidationMode::Relaxed,
        _ => ValidationMode::Strict,
    }
}

pub fn purpose_from_str(s: &str) -> Result<Purpose> {
    match s {
        "exchange" => Ok(Purpose::Exchange),
        "submission" => Ok(Purpose::Submission),
        "mailbox" => Ok(Purpose::Mailbox),
        other => bail!("unknown --purpose '{other}', use: exchange|submission|mailbox"),
    }
}

pub fn provider_from_arg(arg: Option<&str>) -> Result<Option<Provider>> {
    arg.map(|name| name.parse::<Provider>().map_err(anyhow::Error::msg))
        .transpose()
}

/// Password from the environment, never from argv.
pub fn password() -> Result<String> {
    std::env::var(PASSWORD_ENV).with_context(|| format!("set {PASSWORD_ENV}"))
}
