use std::collections::HashSet;
use std::io::{self, Read};

use anyhow::{Context, Result};
use mailprobe_lib::{
    Config, MailboxCredentials, Router, Scanner, SendAttempt, SmtpCredentials,
};

use crate::args::{Cli, password, provider_from_arg};
use crate::output::{any_failed, write_reports};

pub struct SendArgs<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: Option<&'a str>,
    pub user: Option<&'a str>,
    pub provider: Option<&'a str>,
}

pub fn run_send(cli: &Cli, config: &Config, args: SendArgs<'_>) -> Result<bool> {
    let body = match args.body {
        Some(body) => body.to_string(),
        None => {
            let mut body = String::new();
            io::stdin()
                .read_to_string(&mut body)
                .context("read body from stdin")?;
            body
        }
    };
    let attempt = SendAttempt {
        sender: args.from.to_string(),
        recipient: args.to.to_string(),
        subject: args.subject.to_string(),
        body,
        provider_hint: provider_from_arg(args.provider)?,
        credentials: Some(SmtpCredentials::new(
            args.user.unwrap_or(args.from),
            password()?,
        )),
    };
    let rows = vec![Router::new(config).send(&attempt)];
    write_reports(&rows, cli)?;
    Ok(any_failed(&rows))
}

pub fn run_scan(
    cli: &Cli,
    config: &Config,
    account: &str,
    sent_to: &[String],
    provider: Option<&str>,
) -> Result<bool> {
    let mut credentials = MailboxCredentials::new(account, password()?);
    credentials.provider_hint = provider_from_arg(provider)?;
    let sent_to: HashSet<String> = sent_to.iter().map(|s| s.trim().to_ascii_lowercase()).collect();

    let rows = vec![Scanner::new(config).scan(&credentials, &sent_to)];
    write_reports(&rows, cli)?;
    Ok(any_failed(&rows))
}
