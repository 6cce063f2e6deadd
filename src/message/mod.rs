//! The message model: parsed headers, Maildir flags, and on-demand MIME
//! attachment/body decoding.
//!
//! Split across submodules: [`flags`] for the `:2,` bitset, [`header`] for
//! ordered/indexed header storage, [`decode`] for the transfer-encoding
//! primitives, [`mime`] for boundary scanning.

pub mod decode;
pub mod flags;
pub mod header;
pub mod mime;

use std::cell::{Ref, RefCell};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::error::{MdsortError, Result};
pub use flags::Flags;
pub use header::HeaderList;

#[derive(Debug)]
pub struct Message {
    path: PathBuf,
    basename: String,
    flags: Flags,
    headers: HeaderList,
    /// Bytes after the header/body separator, exactly as read from disk —
    /// not yet transfer-decoded.
    body_raw: Vec<u8>,
    /// MIME nesting depth of this message; 0 for a message read straight
    /// from a Maildir file, N+1 for an attachment parsed out of a depth-N
    /// multipart part.
    depth: u32,
    decoded_body: RefCell<Option<Vec<u8>>>,
    attachments_cache: RefCell<Option<Vec<Message>>>,
}

impl Message {
    /// Parse a whole message file. Skips a leading mbox `From ` separator
    /// line if present.
    pub fn parse(path: PathBuf, data: &[u8]) -> Result<Message> {
        Message::parse_at_depth(path, data, 0)
    }

    fn parse_at_depth(path: PathBuf, data: &[u8], depth: u32) -> Result<Message> {
        let basename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let flags = Flags::from_filename(&basename)?.unwrap_or_default();

        let data = if data.starts_with(b"From ") {
            match memchr::memchr(b'\n', data) {
                Some(nl) => &data[nl + 1..],
                None => &data[data.len()..],
            }
        } else {
            data
        };

        let (headers, body_start) = parse_headers(data)?;
        let body_raw = data[body_start..].to_vec();

        Ok(Message {
            path,
            basename,
            flags,
            headers,
            body_raw,
            depth,
            decoded_body: RefCell::new(None),
            attachments_cache: RefCell::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn basename(&self) -> &str {
        &self.basename
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    pub fn headers(&self) -> &HeaderList {
        &self.headers
    }

    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        self.headers.set(key, value);
    }

    /// Name of the directory the message file currently lives in (`new`,
    /// `cur`, or whatever subdir a prior `flag` action moved it to).
    pub fn parent_subdir(&self) -> Option<&str> {
        self.path.parent().and_then(|p| p.file_name()).and_then(|s| s.to_str())
    }

    /// `NEW`: parent component is `new` and `S` is unset.
    pub fn is_new(&self) -> bool {
        self.parent_subdir() == Some("new") && !self.flags.is_set(flags::SEEN)
    }

    pub fn content_type(&self) -> String {
        self.headers
            .get("Content-Type")
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    pub fn content_transfer_encoding(&self) -> String {
        self.headers
            .get("Content-Transfer-Encoding")
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    pub fn is_content_type(&self, prefix: &str) -> bool {
        self.content_type().to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase())
    }

    /// Raw (not transfer-decoded) body, for matching `BODY` predicates
    /// against the bytes actually on disk and for `write()`.
    pub fn body_raw(&self) -> &[u8] {
        &self.body_raw
    }

    /// The selected, transfer-decoded body (prefers `text/plain` over
    /// `text/html` within a `multipart/alternative`), cached after the first
    /// call.
    pub fn body(&self) -> Result<Vec<u8>> {
        if let Some(cached) = self.decoded_body.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let decoded = self.select_body()?;
        *self.decoded_body.borrow_mut() = Some(decoded.clone());
        Ok(decoded)
    }

    fn select_body(&self) -> Result<Vec<u8>> {
        if self.is_content_type("multipart/alternative") {
            let parts = self.attachments()?;
            if let Some(m) = parts.iter().find(|m| m.is_content_type("text/plain")) {
                return m.body();
            }
            if let Some(m) = parts.iter().find(|m| m.is_content_type("text/html")) {
                return m.body();
            }
        }
        Ok(decode_transfer(&self.body_raw, &self.content_transfer_encoding()))
    }

    /// Nested attachment messages, parsed on first access. Empty for a
    /// non-multipart message. Exceeding [`mime::MAX_DEPTH`] is a parse
    /// error.
    pub fn attachments(&self) -> Result<Ref<'_, Vec<Message>>> {
        if self.attachments_cache.borrow().is_none() {
            let parsed = if !mime::is_multipart(&self.content_type()) {
                Vec::new()
            } else {
                if self.depth >= mime::MAX_DEPTH {
                    return Err(MdsortError::parse(format!(
                        "{}: MIME nesting exceeds depth {}",
                        self.path.display(),
                        mime::MAX_DEPTH
                    )));
                }
                let boundary = mime::extract_boundary(&self.content_type()).ok_or_else(|| {
                    MdsortError::parse(format!("{}: multipart message missing boundary", self.path.display()))
                })?;
                let segments = mime::split_parts(&self.body_raw, &boundary);
                let mut out = Vec::with_capacity(segments.len());
                for seg in segments {
                    out.push(Message::parse_at_depth(self.path.clone(), &seg, self.depth + 1)?);
                }
                out
            };
            *self.attachments_cache.borrow_mut() = Some(parsed);
        }
        Ok(Ref::map(self.attachments_cache.borrow(), |o| o.as_ref().unwrap()))
    }

    /// Parse `field` (e.g. `"Date"`) as an RFC 2822 date, for the `DATE`
    /// predicate.
    pub fn header_date(&self, field: &str) -> Option<DateTime<FixedOffset>> {
        let raw = self.headers.get(field).into_iter().next()?;
        DateTime::parse_from_rfc2822(raw.trim()).ok()
    }

    /// Serialize headers (original insertion order) followed by the raw
    /// body, exactly what `write_to` persists and what `exec`'s
    /// `stdin=message` mode feeds a child process.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body_raw.len() + 256);
        for h in self.headers.iter_by_id() {
            out.extend_from_slice(h.key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(h.raw_value.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body_raw);
        out
    }

    /// Serialize headers (in original insertion order) and the raw body to
    /// `path`, truncating any existing file, and fsync. Used by the `label`
    /// action after `set_header` rewrites `X-Label`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| MdsortError::io_at(path, e))?;
        file.write_all(&self.serialize()).map_err(|e| MdsortError::io_at(path, e))?;
        file.sync_all().map_err(|e| MdsortError::io_at(path, e))?;
        Ok(())
    }

    /// Update the basename (and therefore `path`'s file component) after a
    /// rename, without reparsing the message content.
    pub fn set_path(&mut self, path: PathBuf) {
        self.basename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        self.path = path;
    }
}

fn decode_transfer(raw: &[u8], encoding: &str) -> Vec<u8> {
    match encoding.trim().to_ascii_lowercase().as_str() {
        "base64" => decode::base64_decode(&String::from_utf8_lossy(raw)),
        "quoted-printable" => decode::quoted_printable_decode(&String::from_utf8_lossy(raw)),
        _ => raw.to_vec(),
    }
}

/// Parse the header block of `data`, returning the populated `HeaderList`
/// and the byte offset where the body begins (after the blank-line
/// terminator). Folding: a line beginning with space/tab continues the
/// previous header's raw value.
fn parse_headers(data: &[u8]) -> Result<(HeaderList, usize)> {
    let mut headers = HeaderList::new();
    let mut current: Option<(String, String)> = None;
    let mut pos = 0usize;

    loop {
        let line_end = memchr::memchr(b'\n', &data[pos..]).map(|i| pos + i).unwrap_or(data.len());
        let raw_line = &data[pos..line_end];
        let line = if raw_line.last() == Some(&b'\r') {
            &raw_line[..raw_line.len() - 1]
        } else {
            raw_line
        };

        if line.is_empty() {
            if let Some((k, v)) = current.take() {
                headers.push_raw(k, v);
            }
            let body_start = if line_end < data.len() { line_end + 1 } else { data.len() };
            return Ok((headers, body_start));
        }

        if matches!(line.first(), Some(b' ') | Some(b'\t')) && current.is_some() {
            let (_, v) = current.as_mut().unwrap();
            v.push('\n');
            v.push_str(&String::from_utf8_lossy(line));
        } else {
            if let Some((k, v)) = current.take() {
                headers.push_raw(k, v);
            }
            match line.iter().position(|&b| b == b':') {
                Some(colon) => {
                    let key = String::from_utf8_lossy(&line[..colon]).trim().to_string();
                    let mut val = &line[colon + 1..];
                    while val.first() == Some(&b' ') {
                        val = &val[1..];
                    }
                    current = Some((key, String::from_utf8_lossy(val).into_owned()));
                }
                None => {
                    current = Some((String::from_utf8_lossy(line).into_owned(), String::new()));
                }
            }
        }

        if line_end >= data.len() {
            if let Some((k, v)) = current.take() {
                headers.push_raw(k, v);
            }
            return Ok((headers, data.len()));
        }
        pos = line_end + 1;
    }
}
