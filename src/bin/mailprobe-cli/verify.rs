use std::io::{self, BufRead};

use anyhow::{Context, Result};
use mailprobe_lib::{
    CancelToken, Config, Progress, Scorer, Verifier, normalize_email, score_batch, verify_batch,
};

use crate::args::{Cli, mode_from_str};
use crate::output::{VerifyRow, any_failed, write_reports};

/// Addresses from argv, or one per line from stdin when argv is empty.
pub fn addresses_or_stdin(args: &[String]) -> Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args.to_vec());
    }
    let mut out = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("read stdin")?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            out.push(line.to_string());
        }
    }
    Ok(out)
}

pub fn run_validate(cli: &Cli, mode: &str, emails: &[String]) -> Result<bool> {
    let mode = mode_from_str(mode);
    let rows: Vec<_> = addresses_or_stdin(emails)?
        .iter()
        .map(|email| normalize_email(email, mode))
        .collect();
    write_reports(&rows, cli)?;
    Ok(any_failed(&rows))
}

pub fn run_verify(cli: &Cli, config: &Config, email: &str, transcript: bool) -> Result<bool> {
    let rows = vec![VerifyRow {
        result: Verifier::new(config).verify(email),
        transcript,
    }];
    write_reports(&rows, cli)?;
    Ok(any_failed(&rows))
}

pub fn run_score(cli: &Cli, config: &Config, email: &str) -> Result<bool> {
    let rows = vec![Scorer::new(config).score(email)];
    write_reports(&rows, cli)?;
    Ok(any_failed(&rows))
}

pub fn run_batch(
    cli: &Cli,
    config: &Config,
    score: bool,
    concurrency: Option<usize>,
) -> Result<bool> {
    let addresses = addresses_or_stdin(&[])?;
    let mut config = config.clone();
    if let Some(workers) = concurrency {
        config.max_concurrent_verifications = workers.max(1);
    }
    let progress = Progress::new();
    let cancel = CancelToken::new();

    if score {
        let rows: Vec<_> = score_batch(&addresses, &config, &progress, &cancel)
            .into_values()
            .collect();
        write_reports(&rows, cli)?;
        Ok(any_failed(&rows))
    } else {
        let rows: Vec<_> = verify_batch(&addresses, &config, &progress, &cancel)
            .into_values()
            .map(|result| VerifyRow {
                result,
                transcript: false,
            })
            .collect();
        write_reports(&rows, cli)?;
        Ok(any_failed(&rows))
    }
}
