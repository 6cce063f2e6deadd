//! MIME multipart boundary scanning.
//!
//! Pure byte-slice splitting only — reparsing each segment into a nested
//! `Message` is the caller's job (`message::Message::attachments`), since
//! that's where the recursive depth counter and the `Message` type itself
//! live.

/// Nesting-depth bound for recursive multipart parsing. Exceeding it is a
/// parse error rather than a silent truncation.
pub const MAX_DEPTH: u32 = 4;

/// Extract the `boundary="..."` (or unquoted `boundary=...`) parameter from
/// a `Content-Type` header value.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let pos = lower.find("boundary=")?;
    let rest = &content_type[pos + "boundary=".len()..];
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else {
        let end = rest.find(|c: char| c == ';' || c.is_whitespace()).unwrap_or(rest.len());
        let val = rest[..end].trim();
        if val.is_empty() {
            None
        } else {
            Some(val.to_string())
        }
    }
}

pub fn is_multipart(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().starts_with("multipart/")
}

/// Split `body` into the segments delimited by `--<boundary>` lines, up to
/// and excluding the closing `--<boundary>--` line. Segments are returned
/// with their leading/trailing newline trimmed; a body with no recognizable
/// delimiter at all yields an empty vector (not an error — the caller falls
/// back to treating the message as having no parseable attachments).
pub fn split_parts(body: &[u8], boundary: &str) -> Vec<Vec<u8>> {
    let open = format!("--{}", boundary);
    let close = format!("--{}--", boundary);

    let mut parts = Vec::new();
    let mut current_start: Option<usize> = None;
    let mut pos = 0usize;

    while pos <= body.len() {
        let line_end = memchr::memchr(b'\n', &body[pos..])
            .map(|i| pos + i)
            .unwrap_or(body.len());
        let line = trim_cr(&body[pos..line_end]);

        if line == close.as_bytes() {
            if let Some(start) = current_start {
                parts.push(trim_segment(&body[start..pos]));
            }
            return parts;
        }
        if line == open.as_bytes() {
            if let Some(start) = current_start {
                parts.push(trim_segment(&body[start..pos]));
            }
            current_start = Some(if line_end < body.len() { line_end + 1 } else { body.len() });
        }

        if line_end >= body.len() {
            break;
        }
        pos = line_end + 1;
    }
    parts
}

fn trim_cr(line: &[u8]) -> &[u8] {
    if line.last() == Some(&b'\r') {
        &line[..line.len() - 1]
    } else {
        line
    }
}

fn trim_segment(seg: &[u8]) -> Vec<u8> {
    let mut s = seg;
    if s.first() == Some(&b'\n') {
        s = &s[1..];
    }
    while s.last() == Some(&b'\n') {
        s = &s[..s.len() - 1];
    }
    if s.last() == Some(&b'\r') {
        s = &s[..s.len() - 1];
    }
    s.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_boundary_quoted() {
        assert_eq!(
            extract_boundary(r#"multipart/mixed; boundary="abc123""#).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn extract_boundary_unquoted() {
        assert_eq!(
            extract_boundary("multipart/mixed; boundary=abc123").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn is_multipart_detects_prefix() {
        assert!(is_multipart("multipart/alternative; boundary=x"));
        assert!(!is_multipart("text/plain"));
    }

    #[test]
    fn split_parts_two_segments() {
        let body = b"preamble\n--B\nPart: 1\n\nfirst\n--B\nPart: 2\n\nsecond\n--B--\nepilogue";
        let parts = split_parts(body, "B");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], b"Part: 1\n\nfirst");
        assert_eq!(parts[1], b"Part: 2\n\nsecond");
    }

    #[test]
    fn split_parts_no_boundary_found() {
        assert!(split_parts(b"no delimiters here", "B").is_empty());
    }
}
