mod args;
mod mailbox;
mod output;
mod verify;

use anyhow::Result;
use clap::Parser;
use mailprobe_lib::EndpointResolver;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands, provider_from_arg, purpose_from_str};
use output::{any_failed, write_reports};

fn init_tracing(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<bool> {
    let config = cli.load_config()?;
    match &cli.cmd {
        Commands::Validate { mode, emails } => verify::run_validate(cli, mode, emails),
        Commands::Endpoints {
            domain,
            purpose,
            provider,
        } => {
            let resolver = EndpointResolver::new(
                &config.provider_overrides,
                config.max_generic_candidates,
            );
            let rows = vec![resolver.resolve(
                domain,
                provider_from_arg(provider.as_deref())?,
                purpose_from_str(purpose)?,
            )];
            write_reports(&rows, cli)?;
            Ok(any_failed(&rows))
        }
        Commands::Verify { email, transcript } => {
            verify::run_verify(cli, &config, email, *transcript)
        }
        Commands::Score { email } => verify::run_score(cli, &config, email),
        Commands::Batch { score, concurrency } => {
            verify::run_batch(cli, &config, *score, *concurrency)
        }
        Commands::Send {
            from,
            to,
            subject,
            body,
            user,
            provider,
        } => mailbox::run_send(
            cli,
            &config,
            mailbox::SendArgs {
                from,
                to,
                subject,
                body: body.as_deref(),
                user: user.as_deref(),
                provider: provider.as_deref(),
            },
        ),
        Commands::Scan {
            account,
            sent_to,
            provider,
        } => mailbox::run_scan(cli, &config, account, sent_to, provider.as_deref()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    // exit codes: 0 all ok, 2 some invalid/failed, 1 fatal
    if run(&cli)? {
        std::process::exit(2);
    }
    Ok(())
}
