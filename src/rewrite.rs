//! Forced-sender header rewrite.
//!
//! Replaces the `From` header of a raw RFC 5322 message while keeping the
//! original author reachable through `X-Original-From` and, when missing,
//! `Reply-To`. Only the header fields named here are touched; every other
//! byte of the message, body included, is copied through unchanged.

use log::{debug, info};
use std::ops::Range;

use crate::error::{Error, Result};

pub const TRACE_HEADER: &str = "X-Original-From";

/// One header field: its first line plus any folded continuation lines,
/// line endings included.
#[derive(Debug)]
struct Field {
    span: Range<usize>,
    name: Option<String>,
}

/// Header fields of a message and the offset where the header block ends
/// (start of the empty separator line, or end of input when there is none).
#[derive(Debug)]
struct HeaderBlock {
    fields: Vec<Field>,
    end: usize,
}

impl HeaderBlock {
    fn parse(raw: &[u8]) -> Self {
        let mut fields: Vec<Field> = Vec::new();
        let mut pos = 0;
        let mut end = raw.len();

        while pos < raw.len() {
            let line_end = raw[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(raw.len(), |i| pos + i + 1);
            let line = &raw[pos..line_end];

            if line == b"\n" || line == b"\r\n" {
                end = pos;
                break;
            }

            let folded = matches!(line.first(), Some(b' ') | Some(b'\t'));
            match fields.last_mut() {
                Some(field) if folded => field.span.end = line_end,
                _ => fields.push(Field {
                    span: pos..line_end,
                    name: field_name(line),
                }),
            }
            pos = line_end;
        }

        HeaderBlock { fields, end }
    }

    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.is(name))
    }
}

impl Field {
    fn is(&self, name: &str) -> bool {
        self.name
            .as_deref()
            .is_some_and(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Field name of a header line, or `None` when the line is not a well-formed
/// `name: value` field.
fn field_name(line: &[u8]) -> Option<String> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name = &line[..colon];
    let valid = !name.is_empty() && name.iter().all(|&b| (33..=126).contains(&b));
    valid.then(|| String::from_utf8_lossy(name).into_owned())
}

/// Raw field value: everything after the colon, leading blanks and the final
/// line ending removed, inner folding preserved.
fn raw_value(span: &[u8]) -> &[u8] {
    let colon = span.iter().position(|&b| b == b':').map_or(0, |i| i + 1);
    let mut value = &span[colon..];
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b'\r' | b'\n' | b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

fn line_ending(raw: &[u8]) -> &'static [u8] {
    match raw.iter().position(|&b| b == b'\n') {
        Some(i) if i > 0 && raw[i - 1] == b'\r' => b"\r\n",
        Some(_) => b"\n",
        None => b"\r\n",
    }
}

fn push_field(out: &mut Vec<u8>, name: &str, value: &[u8], eol: &[u8]) {
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value);
    out.extend_from_slice(eol);
}

/// Return `raw` unchanged when no forced sender is configured, otherwise the
/// rewritten message.
pub fn prepare_payload(raw: Vec<u8>, force_from: Option<&str>) -> Result<Vec<u8>> {
    match force_from {
        Some(forced) => force_sender(&raw, forced),
        None => Ok(raw),
    }
}

/// Rewrite the `From` header of `raw` to `forced`.
///
/// The first `From` field is replaced in place and any further `From` fields
/// are dropped. Its original raw value is recorded as `X-Original-From` and
/// copied to `Reply-To` when the message has no `Reply-To`. If the current
/// `From` already equals `forced` the input is returned byte for byte.
pub fn force_sender(raw: &[u8], forced: &str) -> Result<Vec<u8>> {
    if raw.is_empty() {
        return Err(Error::Parse("message on stdin is empty".to_string()));
    }

    let block = HeaderBlock::parse(raw);
    let eol = line_ending(raw);
    let mut out = Vec::with_capacity(raw.len() + 2 * forced.len() + 64);

    let Some(first_from) = block.fields.iter().position(|f| f.is("From")) else {
        debug!("[rewrite] message has no From header, inserting one");
        out.extend_from_slice(&raw[..block.end]);
        if !out.is_empty() && !out.ends_with(b"\n") {
            out.extend_from_slice(eol);
        }
        push_field(&mut out, "From", forced.as_bytes(), eol);
        out.extend_from_slice(&raw[block.end..]);
        return Ok(out);
    };

    let from_span = &raw[block.fields[first_from].span.clone()];
    let (header, _) = mailparse::parse_header(from_span)
        .map_err(|e| Error::Parse(format!("malformed From header: {}", e)))?;
    if header.get_value().trim() == forced {
        debug!("[rewrite] From already matches forced sender, leaving message untouched");
        return Ok(raw.to_vec());
    }

    let original = raw_value(from_span);
    let add_reply_to = !original.is_empty() && !block.has("Reply-To");

    out.extend_from_slice(&raw[..block.fields[first_from].span.start]);
    for (i, field) in block.fields.iter().enumerate().skip(first_from) {
        if i == first_from {
            push_field(&mut out, "From", forced.as_bytes(), eol);
            if !original.is_empty() {
                push_field(&mut out, TRACE_HEADER, original, eol);
            }
            if add_reply_to {
                push_field(&mut out, "Reply-To", original, eol);
            }
        } else if field.is("From") {
            debug!("[rewrite] dropping additional From header");
        } else {
            out.extend_from_slice(&raw[field.span.clone()]);
        }
    }
    if !out.ends_with(b"\n") {
        out.extend_from_slice(eol);
    }
    out.extend_from_slice(&raw[block.end..]);

    info!(
        "[rewrite] From rewritten (reply_to_added={}, {} -> {} bytes)",
        add_reply_to,
        raw.len(),
        out.len()
    );
    Ok(out)
}
