//! Print the number of messages in a POP3 mailbox.

use clap::Parser;
use std::io::{self, Write};
use std::process::ExitCode;

use mailrelay::{cli, mailbox, Environment, Pop3Config, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, after_help = cli::POP3_ENV_HELP)]
struct Args {
    /// Log more detail to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run() -> Result<()> {
    let config = Pop3Config::from_env(&Environment::from_process())?;
    let count = mailbox::count_messages(&config)?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", count)?;
    stdout.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    cli::init_logging(args.verbose);
    cli::finish(run())
}
