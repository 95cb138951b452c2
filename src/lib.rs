//! Relay a raw message through an authenticated SMTP server, and count the
//! messages waiting in a POP3 mailbox.
//!
//! All configuration comes from environment variables, resolved once into
//! typed configs ([`SmtpConfig`], [`Pop3Config`]) before any connection is
//! opened.

pub mod cli;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod pop3;
pub mod relay;
pub mod rewrite;
pub mod tls;

pub use config::{Environment, Pop3Config, SmtpConfig, NETWORK_TIMEOUT};
pub use error::{Error, Result};
pub use relay::{SmtpRelay, Submit};
