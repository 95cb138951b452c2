//! Process plumbing shared by the binaries.

use log::debug;
use std::io::{self, Read};
use std::process::ExitCode;

use crate::error::Result;

/// Environment variable help shown by the SMTP tools' `--help`.
pub const SMTP_ENV_HELP: &str = "\
Environment variables:
  DST_SMTP_HOST         SMTP server host (required)
  DST_SMTP_PORT         SMTP server port (required)
  DST_SMTP_USER         account name, also the envelope sender (required)
  DST_SMTP_PASS         account password (required)
  DST_RCPT_TO           comma-separated envelope recipients (default: DST_SMTP_USER)
  DST_SMTP_STARTTLS     STARTTLS instead of direct TLS (default: true)
  DST_SMTP_TLS_VERIFY   verify the server certificate (default: true)";

pub const FORCE_FROM_HELP: &str = "\
  DST_FORCE_FROM        replacement From header; the original is kept in
                        X-Original-From and Reply-To";

pub const POP3_ENV_HELP: &str = "\
Environment variables:
  SRC_HOST              POP3 server host (required)
  SRC_PORT              POP3 server port (required)
  SRC_USER              account name (required)
  SRC_PASS              account password (required)
  SRC_SSL               implicit TLS (default: true)
  SRC_STARTTLS          upgrade with STLS (default: false)
  SRC_TLS_VERIFY        verify the server certificate (default: true)";

/// Set up `env_logger`. Quiet by default so stderr only carries failures;
/// `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// Buffer all of stdin.
pub fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;
    debug!("[cli] read message from stdin ({} bytes)", buffer.len());
    Ok(buffer)
}

/// Map a run result to the process exit status, reporting failures on a
/// single stderr line.
pub fn finish(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.single_line());
            e.exit_code()
        }
    }
}
