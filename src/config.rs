//! Environment-driven configuration.
//!
//! The process environment is read once into an [`Environment`] snapshot and
//! every typed config is resolved from that snapshot, so callers and tests can
//! inject their own values instead of touching ambient process state.

use log::{debug, info};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use lettre::Address;

use crate::error::{Error, Result};

/// Fixed timeout applied to every network operation.
pub const NETWORK_TIMEOUT: Duration = Duration::from_secs(60);

const TRUTHY: [&str; 3] = ["true", "1", "yes"];
const FALSY: [&str; 3] = ["false", "0", "no"];

/// Immutable snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    /// Value of `name`, treating an empty string as absent.
    pub fn optional(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.optional(name)
            .ok_or_else(|| Error::Config(format!("Missing env: {}", name)))
    }

    pub fn port(&self, name: &str) -> Result<u16> {
        let raw = self.required(name)?;
        raw.trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a port number, got {:?}", name, raw)))
    }

    /// Boolean flag: `true`/`1`/`yes` and `false`/`0`/`no` (any case) are
    /// recognised; absence or any other value yields `default`.
    pub fn flag(&self, name: &str, default: bool) -> bool {
        let Some(raw) = self.optional(name) else {
            return default;
        };
        let value = raw.trim().to_ascii_lowercase();
        if TRUTHY.contains(&value.as_str()) {
            true
        } else if FALSY.contains(&value.as_str()) {
            false
        } else {
            debug!("[config] {} has unrecognised value, using default {}", name, default);
            default
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Environment {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings for the SMTP relay tools.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Envelope sender; always the authenticated account.
    pub mail_from: Address,
    /// Envelope recipients; never empty.
    pub recipients: Vec<Address>,
    pub starttls: bool,
    pub tls_verify: bool,
}

impl SmtpConfig {
    pub fn from_env(env: &Environment) -> Result<Self> {
        let host = env.required("DST_SMTP_HOST")?.to_string();
        let port = env.port("DST_SMTP_PORT")?;
        let user = env.required("DST_SMTP_USER")?.to_string();
        let password = env.required("DST_SMTP_PASS")?.to_string();

        let rcpt_raw = env.optional("DST_RCPT_TO").unwrap_or(user.as_str());
        let rcpt = split_recipients(rcpt_raw);
        if rcpt.is_empty() {
            return Err(Error::Config(
                "DST_RCPT_TO resolved to an empty recipient list".to_string(),
            ));
        }
        let recipients = rcpt
            .iter()
            .map(|addr| {
                addr.parse::<Address>().map_err(|e| {
                    Error::Config(format!("DST_RCPT_TO: invalid address {:?}: {}", addr, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mail_from = user.parse::<Address>().map_err(|e| {
            Error::Config(format!(
                "DST_SMTP_USER must be a valid envelope address: {}",
                e
            ))
        })?;

        let starttls = env.flag("DST_SMTP_STARTTLS", true);
        let tls_verify = env.flag("DST_SMTP_TLS_VERIFY", true);
        if !tls_verify {
            info!("[config] DST_SMTP_TLS_VERIFY is off, server certificates will not be checked");
        }

        Ok(SmtpConfig {
            host,
            port,
            user,
            password,
            mail_from,
            recipients,
            starttls,
            tls_verify,
        })
    }
}

/// Values sent verbatim on a protocol command line must not carry line
/// breaks. The error names the variable, never the value.
fn single_line(name: &str, value: &str) -> Result<String> {
    if value.contains(['\r', '\n']) {
        return Err(Error::Config(format!("{} must not contain line breaks", name)));
    }
    Ok(value.to_string())
}

/// Replacement `From` header value from `DST_FORCE_FROM`, if set. Only the
/// rewriting relay reads it.
pub fn force_from(env: &Environment) -> Result<Option<String>> {
    env.optional("DST_FORCE_FROM")
        .map(|v| validate_force_from(v.trim()))
        .transpose()
}

fn validate_force_from(value: &str) -> Result<String> {
    if value.contains(['\r', '\n']) {
        return Err(Error::Config(
            "DST_FORCE_FROM must not contain line breaks".to_string(),
        ));
    }
    match mailparse::addrparse(value) {
        Ok(list) if !list.is_empty() => Ok(value.to_string()),
        Ok(_) => Err(Error::Config("DST_FORCE_FROM contains no address".to_string())),
        Err(e) => Err(Error::Config(format!("DST_FORCE_FROM is not a valid address: {}", e))),
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("recipients", &self.recipients)
            .field("starttls", &self.starttls)
            .field("tls_verify", &self.tls_verify)
            .finish()
    }
}

/// Settings for the POP3 mailbox counter.
#[derive(Clone)]
pub struct Pop3Config {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub use_ssl: bool,
    pub use_starttls: bool,
    pub tls_verify: bool,
}

impl Pop3Config {
    pub fn from_env(env: &Environment) -> Result<Self> {
        let host = env.required("SRC_HOST")?.to_string();
        let port = env.port("SRC_PORT")?;
        let user = single_line("SRC_USER", env.required("SRC_USER")?)?;
        let password = single_line("SRC_PASS", env.required("SRC_PASS")?)?;
        let use_ssl = env.flag("SRC_SSL", true);
        let use_starttls = env.flag("SRC_STARTTLS", false);

        if use_ssl && use_starttls {
            return Err(Error::Config(
                "SRC_SSL and SRC_STARTTLS cannot both be true".to_string(),
            ));
        }

        let tls_verify = env.flag("SRC_TLS_VERIFY", true);
        if !tls_verify && (use_ssl || use_starttls) {
            info!("[config] SRC_TLS_VERIFY is off, server certificates will not be checked");
        }

        Ok(Pop3Config {
            host,
            port,
            user,
            password,
            use_ssl,
            use_starttls,
            tls_verify,
        })
    }
}

impl fmt::Debug for Pop3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pop3Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("tls_verify", &self.tls_verify)
            .finish()
    }
}
