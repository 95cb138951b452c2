//! Error taxonomy shared by the relay and mailbox tools

use std::process::ExitCode;

use thiserror::Error;

/// Exit status used for every failure.
pub const FAILURE_STATUS: u8 = 2;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid environment configuration.
    #[error("{0}")]
    Config(String),

    /// Connect, timeout or TLS handshake failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server rejected a command or answered with something unparseable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The message read from stdin could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(FAILURE_STATUS)
    }

    /// Render the error on a single line.
    pub fn single_line(&self) -> String {
        self.to_string()
            .split(['\r', '\n'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// True for failures detected before any connection was attempted.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl From<lettre::transport::smtp::Error> for Error {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        if err.is_permanent() || err.is_transient() || err.is_response() {
            Error::Protocol(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Network(format!("TLS: {}", err))
    }
}
