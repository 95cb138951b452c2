//! SMTP submission.
//!
//! The envelope is always built from configuration: the sender is the
//! authenticated account and the recipients are the resolved `DST_RCPT_TO`
//! list. Addresses inside the message are never consulted.

use log::{debug, info};

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::Tls;
use lettre::{SmtpTransport, Transport};

use crate::config::{SmtpConfig, NETWORK_TIMEOUT};
use crate::error::{Error, Result};
use crate::tls;

/// Something that can deliver a raw message for an envelope.
pub trait Submit {
    fn submit(&self, envelope: &Envelope, raw: &[u8]) -> Result<()>;
}

/// lettre's blocking SMTP transport. Without connection pooling every
/// submission opens its own session and closes it afterwards, whether or not
/// delivery succeeded.
pub struct SmtpRelay {
    transport: SmtpTransport,
}

impl SmtpRelay {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let params = tls::smtp_parameters(&config.host, config.tls_verify)?;
        let tls = if config.starttls {
            // lettre re-issues EHLO after the upgrade.
            Tls::Required(params)
        } else {
            Tls::Wrapper(params)
        };
        debug!(
            "[relay] transport for {}:{} (starttls={}, verify={})",
            config.host, config.port, config.starttls, config.tls_verify
        );

        let transport = SmtpTransport::builder_dangerous(config.host.as_str())
            .port(config.port)
            .tls(tls)
            .credentials(Credentials::new(config.user.clone(), config.password.clone()))
            .timeout(Some(NETWORK_TIMEOUT))
            .build();

        Ok(SmtpRelay { transport })
    }
}

impl Submit for SmtpRelay {
    fn submit(&self, envelope: &Envelope, raw: &[u8]) -> Result<()> {
        let response = self.transport.send_raw(envelope, raw)?;
        debug!("[relay] server accepted message: {}", response.code());
        Ok(())
    }
}

pub fn envelope(config: &SmtpConfig) -> Result<Envelope> {
    Envelope::new(Some(config.mail_from.clone()), config.recipients.clone())
        .map_err(|e| Error::Config(format!("invalid envelope: {}", e)))
}

/// Submit `payload` for the envelope derived from `config`.
pub fn send<T: Submit>(config: &SmtpConfig, payload: &[u8], transport: &T) -> Result<()> {
    let envelope = envelope(config)?;
    info!(
        "[relay] submitting {} bytes from {} to {} recipient(s) via {}:{}",
        payload.len(),
        config.mail_from,
        config.recipients.len(),
        config.host,
        config.port
    );
    transport.submit(&envelope, payload)?;
    info!("[relay] message submitted");
    Ok(())
}
