use log::{debug, info};
use std::io::{Read, Write};
use std::ops::{Deref, DerefMut};

use crate::config::{Pop3Config, NETWORK_TIMEOUT};
use crate::error::Result;
use crate::pop3::{Session, Stream};
use crate::tls;

/// Owns a session and sends `QUIT` when dropped. Teardown failures are logged
/// and discarded so they never replace the result of the work done before.
pub struct SessionGuard<S: Read + Write> {
    session: Session<S>,
}

impl<S: Read + Write> SessionGuard<S> {
    pub fn new(session: Session<S>) -> Self {
        SessionGuard { session }
    }
}

impl<S: Read + Write> Deref for SessionGuard<S> {
    type Target = Session<S>;

    fn deref(&self) -> &Session<S> {
        &self.session
    }
}

impl<S: Read + Write> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut Session<S> {
        &mut self.session
    }
}

impl<S: Read + Write> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(e) = self.session.quit() {
            debug!("[mailbox] ignoring QUIT failure: {}", e);
        }
    }
}

/// Connect to the configured server and negotiate TLS as requested.
pub fn open_session(config: &Pop3Config) -> Result<Session<Stream>> {
    let stream = Stream::connect(&config.host, config.port, NETWORK_TIMEOUT)?;

    if config.use_ssl {
        let tls_config = tls::client_config(config.tls_verify)?;
        let stream = stream.into_tls(&config.host, tls_config)?;
        return Session::start(stream);
    }

    let session = Session::start(stream)?;
    if config.use_starttls {
        let tls_config = tls::client_config(config.tls_verify)?;
        return session.starttls(&config.host, tls_config);
    }
    Ok(session)
}

/// Authenticate on an open session and return the mailbox message count.
/// The session is closed on every path.
pub fn count_on<S: Read + Write>(session: Session<S>, user: &str, password: &str) -> Result<u64> {
    let mut guard = SessionGuard::new(session);
    guard.login(user, password)?;
    let stat = guard.stat()?;
    info!("[mailbox] {} messages, {} octets", stat.messages, stat.octets);
    Ok(stat.messages)
}

pub fn count_messages(config: &Pop3Config) -> Result<u64> {
    info!(
        "[mailbox] counting messages for {} at {}:{} (ssl={}, starttls={})",
        config.user, config.host, config.port, config.use_ssl, config.use_starttls
    );
    let session = open_session(config)?;
    count_on(session, &config.user, &config.password)
}
