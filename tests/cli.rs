//! End-to-end tests driving the built binaries.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Output, Stdio};
use std::thread;

fn run(bin: &str, env: &[(&str, &str)]) -> Output {
    Command::new(bin)
        .env_clear()
        .envs(env.iter().copied())
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Listener that must never see a connection.
fn untouched_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();
    listener.set_nonblocking(true).unwrap();
    (listener, port)
}

fn assert_no_connection(listener: &TcpListener) {
    match listener.accept() {
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::WouldBlock),
        Ok(_) => panic!("a connection was attempted"),
    }
}

/// Single-connection POP3 server answering from a fixed mailbox.
fn fake_pop3(messages: u64, password: &'static str) -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve_pop3(stream, messages, password)
    });

    (port, handle)
}

fn serve_pop3(mut stream: TcpStream, messages: u64, password: &str) -> Vec<String> {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut commands = Vec::new();
    writeln!(stream, "+OK fake POP3 ready\r").unwrap();

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end().to_string();
        let reply = match line.split_once(' ').map_or((line.as_str(), ""), |(c, a)| (c, a)) {
            ("USER", _) => "+OK".to_string(),
            ("PASS", p) if p == password => "+OK logged in".to_string(),
            ("PASS", _) => "-ERR [AUTH] invalid login".to_string(),
            ("STAT", _) => format!("+OK {} {}", messages, messages * 1000),
            ("QUIT", _) => "+OK bye".to_string(),
            _ => "-ERR unknown command".to_string(),
        };
        commands.push(line.split(' ').next().unwrap_or_default().to_string());
        write!(stream, "{}\r\n", reply).unwrap();
        if reply == "+OK bye" {
            break;
        }
    }
    commands
}

/// Port with nothing listening on it.
fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port().to_string()
}

/// Single-connection SMTP server whose EHLO reply never offers STARTTLS.
/// Returns the command verbs it received.
fn plaintext_only_smtp() -> (String, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut verbs = Vec::new();
        write!(stream, "220 fake.local ESMTP\r\n").unwrap();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let verb = line.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
            let reply = match verb.as_str() {
                "EHLO" => "250-fake.local\r\n250 AUTH PLAIN LOGIN",
                "QUIT" => "221 bye",
                _ => "502 not implemented",
            };
            verbs.push(verb.clone());
            if write!(stream, "{}\r\n", reply).is_err() || verb == "QUIT" {
                break;
            }
        }
        verbs
    });

    (port, handle)
}

#[test]
fn mailbox_count_is_printed_alone() {
    let (port, server) = fake_pop3(42, "pw");
    let output = run(
        env!("CARGO_BIN_EXE_source-mailbox-count"),
        &[
            ("SRC_HOST", "127.0.0.1"),
            ("SRC_PORT", port.as_str()),
            ("SRC_USER", "reader"),
            ("SRC_PASS", "pw"),
            ("SRC_SSL", "false"),
        ],
    );

    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
    assert_eq!(server.join().unwrap(), vec!["USER", "PASS", "STAT", "QUIT"]);
}

#[test]
fn mailbox_auth_failure_exits_2_without_leaking_password() {
    let (port, server) = fake_pop3(3, "right-password");
    let output = run(
        env!("CARGO_BIN_EXE_source-mailbox-count"),
        &[
            ("SRC_HOST", "127.0.0.1"),
            ("SRC_PORT", port.as_str()),
            ("SRC_USER", "reader"),
            ("SRC_PASS", "wrong-password"),
            ("SRC_SSL", "0"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("invalid login"), "stderr: {}", err);
    assert!(!err.contains("wrong-password"));
    assert_eq!(err.lines().count(), 1);
    assert_eq!(server.join().unwrap(), vec!["USER", "PASS", "QUIT"]);
}

#[test]
fn mailbox_tls_modes_conflict_before_connecting() {
    let (listener, port) = untouched_listener();
    let output = run(
        env!("CARGO_BIN_EXE_source-mailbox-count"),
        &[
            ("SRC_HOST", "127.0.0.1"),
            ("SRC_PORT", port.as_str()),
            ("SRC_USER", "reader"),
            ("SRC_PASS", "pw"),
            ("SRC_SSL", "true"),
            ("SRC_STARTTLS", "true"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("SRC_SSL and SRC_STARTTLS"));
    assert_no_connection(&listener);
}

#[test]
fn smtp_missing_host_is_reported() {
    let output = run(
        env!("CARGO_BIN_EXE_smtp-send"),
        &[
            ("DST_SMTP_PORT", "587"),
            ("DST_SMTP_USER", "relay@example.com"),
            ("DST_SMTP_PASS", "pw"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("DST_SMTP_HOST"), "stderr: {}", err);
    assert_eq!(err.lines().count(), 1);
}

#[test]
fn smtp_empty_recipient_list_never_connects() {
    let (listener, port) = untouched_listener();
    for bin in [
        env!("CARGO_BIN_EXE_smtp-send"),
        env!("CARGO_BIN_EXE_smtp-send-rewrite"),
    ] {
        let output = run(
            bin,
            &[
                ("DST_SMTP_HOST", "127.0.0.1"),
                ("DST_SMTP_PORT", port.as_str()),
                ("DST_SMTP_USER", "relay@example.com"),
                ("DST_SMTP_PASS", "pw"),
                ("DST_RCPT_TO", " , ,"),
            ],
        );
        assert_eq!(output.status.code(), Some(2));
        assert!(stderr(&output).contains("empty recipient list"));
    }
    assert_no_connection(&listener);
}

#[test]
fn rewrite_rejects_invalid_forced_sender_before_connecting() {
    let (listener, port) = untouched_listener();
    let output = run(
        env!("CARGO_BIN_EXE_smtp-send-rewrite"),
        &[
            ("DST_SMTP_HOST", "127.0.0.1"),
            ("DST_SMTP_PORT", port.as_str()),
            ("DST_SMTP_USER", "relay@example.com"),
            ("DST_SMTP_PASS", "pw"),
            ("DST_FORCE_FROM", "b@y.com\nBcc: victim@z.com"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("DST_FORCE_FROM"));
    assert_no_connection(&listener);
}

#[test]
fn smtp_with_verification_off_reports_one_line() {
    let port = closed_port();
    let output = run(
        env!("CARGO_BIN_EXE_smtp-send"),
        &[
            ("DST_SMTP_HOST", "127.0.0.1"),
            ("DST_SMTP_PORT", port.as_str()),
            ("DST_SMTP_USER", "relay@example.com"),
            ("DST_SMTP_PASS", "pw"),
            ("DST_SMTP_TLS_VERIFY", "false"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert_eq!(err.lines().count(), 1, "stderr: {}", err);
}

#[test]
fn mailbox_with_verification_off_reports_one_line() {
    let port = closed_port();
    let output = run(
        env!("CARGO_BIN_EXE_source-mailbox-count"),
        &[
            ("SRC_HOST", "127.0.0.1"),
            ("SRC_PORT", port.as_str()),
            ("SRC_USER", "reader"),
            ("SRC_PASS", "pw"),
            ("SRC_TLS_VERIFY", "false"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("network error"), "stderr: {}", err);
    assert_eq!(err.lines().count(), 1, "stderr: {}", err);
}

#[test]
fn mailbox_stls_refusal_never_sends_credentials() {
    let (port, server) = fake_pop3(5, "pw");
    let output = run(
        env!("CARGO_BIN_EXE_source-mailbox-count"),
        &[
            ("SRC_HOST", "127.0.0.1"),
            ("SRC_PORT", port.as_str()),
            ("SRC_USER", "reader"),
            ("SRC_PASS", "pw"),
            ("SRC_SSL", "false"),
            ("SRC_STARTTLS", "true"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    let err = stderr(&output);
    assert!(err.contains("STLS failed"), "stderr: {}", err);
    assert_eq!(server.join().unwrap(), vec!["STLS"]);
}

#[test]
fn smtp_refuses_to_authenticate_without_starttls() {
    let (port, server) = plaintext_only_smtp();
    let output = run(
        env!("CARGO_BIN_EXE_smtp-send"),
        &[
            ("DST_SMTP_HOST", "127.0.0.1"),
            ("DST_SMTP_PORT", port.as_str()),
            ("DST_SMTP_USER", "relay@example.com"),
            ("DST_SMTP_PASS", "pw"),
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("STARTTLS"), "stderr: {}", err);
    assert_eq!(err.lines().count(), 1);

    let verbs = server.join().unwrap();
    assert!(verbs.contains(&"EHLO".to_string()));
    assert!(!verbs.iter().any(|v| v == "AUTH" || v == "MAIL" || v == "RCPT"));
}
