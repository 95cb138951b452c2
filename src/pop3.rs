//! Minimal blocking POP3 client (RFC 1939, STLS from RFC 2595).
//!
//! Only what the mailbox counter needs: greeting, STLS, USER/PASS, STAT and
//! QUIT. The session is generic over the byte stream so it can run over a
//! plain socket, a TLS stream, or an in-memory transcript in tests.

use log::{debug, trace};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls::{ClientConfig, ClientConnection, StreamOwned};

use crate::error::{Error, Result};
use crate::tls;

const MAX_LINE: usize = 4096;

/// Mailbox status as returned by `STAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStat {
    pub messages: u64,
    pub octets: u64,
}

impl MailboxStat {
    /// Parse the text following `+OK` in a STAT reply.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.split_whitespace();
        let mut next = || -> Result<u64> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| Error::Protocol(format!("malformed STAT response: {:?}", text)))
        };
        let messages = next()?;
        let octets = next()?;
        Ok(MailboxStat { messages, octets })
    }
}

/// Socket carrying a POP3 session, either plain or TLS-wrapped.
pub enum Stream {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Stream {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Network(format!("cannot resolve {}:{}: {}", host, port, e)))?;

        let mut last_err = None;
        for addr in addrs {
            debug!("[pop3] connecting to {}", addr);
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(sock) => {
                    apply_timeouts(&sock, timeout)?;
                    return Ok(Stream::Plain(sock));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::Network(match last_err {
            Some(e) => format!("connection to {}:{} failed: {}", host, port, e),
            None => format!("{}:{} resolved to no addresses", host, port),
        }))
    }

    /// Wrap a plain socket in TLS. The handshake completes before returning.
    pub fn into_tls(self, host: &str, config: Arc<ClientConfig>) -> Result<Self> {
        let sock = match self {
            Stream::Plain(sock) => sock,
            Stream::Tls(_) => return Err(Error::Protocol("TLS already active".to_string())),
        };
        let conn = ClientConnection::new(config, tls::server_name(host)?)?;
        let mut tls = StreamOwned::new(conn, sock);
        while tls.conn.is_handshaking() {
            tls.conn
                .complete_io(&mut tls.sock)
                .map_err(|e| Error::Network(format!("TLS handshake with {} failed: {}", host, e)))?;
        }
        debug!("[pop3] TLS established with {}", host);
        Ok(Stream::Tls(Box::new(tls)))
    }
}

fn apply_timeouts(sock: &TcpStream, timeout: Duration) -> Result<()> {
    sock.set_read_timeout(Some(timeout))
        .and_then(|()| sock.set_write_timeout(Some(timeout)))
        .map_err(|e| Error::Network(format!("cannot set socket timeouts: {}", e)))
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf),
            Stream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.write(buf),
            Stream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.flush(),
            Stream::Tls(s) => s.flush(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authorization,
    Transaction,
    Closed,
}

pub struct Session<S: Read + Write> {
    reader: BufReader<S>,
    state: SessionState,
}

impl<S: Read + Write> Session<S> {
    /// Start a session on `stream` and consume the server greeting.
    pub fn start(stream: S) -> Result<Self> {
        let mut session = Session {
            reader: BufReader::new(stream),
            state: SessionState::Authorization,
        };
        let greeting = session.read_reply()?;
        debug!("[pop3] greeting: {}", greeting);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<()> {
        if self.state != SessionState::Authorization {
            return Err(Error::Protocol("already authenticated".to_string()));
        }
        self.command(&format!("USER {}", user), "USER")?;
        self.command(&format!("PASS {}", password), "PASS")?;
        self.state = SessionState::Transaction;
        debug!("[pop3] authenticated");
        Ok(())
    }

    pub fn stat(&mut self) -> Result<MailboxStat> {
        let text = self.command("STAT", "STAT")?;
        MailboxStat::parse(&text)
    }

    /// End the session. The state is closed even when the exchange fails.
    pub fn quit(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.command("QUIT", "QUIT").map(|_| ())
    }

    /// Send `line` and return the text of the `+OK` reply. `label` is what
    /// gets logged in place of the command, so credentials never reach the log.
    fn command(&mut self, line: &str, label: &str) -> Result<String> {
        trace!("[pop3] > {}", label);
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        self.read_reply().map_err(|e| match e {
            Error::Protocol(msg) => Error::Protocol(format!("{} failed: {}", label, msg)),
            other => other,
        })
    }

    fn read_reply(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_LINE as u64)
            .read_until(b'\n', &mut buf)
            .map_err(|e| match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    Error::Network("timed out waiting for server".to_string())
                }
                _ => Error::Network(format!("read failed: {}", e)),
            })?;
        if n == 0 {
            return Err(Error::Network("connection closed by server".to_string()));
        }
        if !buf.ends_with(b"\n") {
            return Err(Error::Protocol("reply line too long".to_string()));
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        trace!("[pop3] < {}", line);

        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim().to_string())
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Err(Error::Protocol(format!("server replied -ERR {}", rest.trim())))
        } else {
            Err(Error::Protocol(format!("malformed reply: {:?}", line)))
        }
    }
}

impl Session<Stream> {
    /// Issue `STLS` and upgrade the underlying socket to TLS.
    pub fn starttls(self, host: &str, config: Arc<ClientConfig>) -> Result<Self> {
        let mut session = self;
        if session.state != SessionState::Authorization {
            return Err(Error::Protocol("STLS is only valid before authentication".to_string()));
        }
        session.command("STLS", "STLS")?;
        if !session.reader.buffer().is_empty() {
            return Err(Error::Protocol("server sent data after STLS reply".to_string()));
        }
        let stream = session.reader.into_inner().into_tls(host, config)?;
        Ok(Session {
            reader: BufReader::new(stream),
            state: SessionState::Authorization,
        })
    }
}
