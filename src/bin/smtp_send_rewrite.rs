//! Relay a raw message from stdin through an authenticated SMTP server,
//! optionally replacing its From header with `DST_FORCE_FROM`.

use clap::Parser;
use std::process::ExitCode;

use mailrelay::{cli, config, relay, rewrite, Environment, Result, SmtpConfig, SmtpRelay};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    after_help = format!("{}\n{}", cli::SMTP_ENV_HELP, cli::FORCE_FROM_HELP)
)]
struct Args {
    /// Log more detail to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run() -> Result<()> {
    let raw = cli::read_stdin()?;
    let env = Environment::from_process();
    let config = SmtpConfig::from_env(&env)?;
    let force_from = config::force_from(&env)?;

    let payload = rewrite::prepare_payload(raw, force_from.as_deref())?;
    let transport = SmtpRelay::new(&config)?;
    relay::send(&config, &payload, &transport)
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::init_logging(args.verbose);
    cli::finish(run())
}
