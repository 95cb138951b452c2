//! Relay a raw message from stdin through an authenticated SMTP server.

use clap::Parser;
use std::process::ExitCode;

use mailrelay::{cli, relay, Environment, Result, SmtpConfig, SmtpRelay};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = cli::SMTP_ENV_HELP)]
struct Args {
    /// Log more detail to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run() -> Result<()> {
    let raw = cli::read_stdin()?;
    let config = SmtpConfig::from_env(&Environment::from_process())?;
    let transport = SmtpRelay::new(&config)?;
    relay::send(&config, &raw, &transport)
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::init_logging(args.verbose);
    cli::finish(run())
}
