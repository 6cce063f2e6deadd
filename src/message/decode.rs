//! Transfer-decoding primitives: base64, quoted-printable, RFC 2047.
//!
//! Pure byte/string functions, deliberately ignorant of headers or messages
//! so they can be tested in isolation from the message model.

/// Decode a base64 body. Invalid input bytes are skipped rather than
/// treated as fatal, tolerating the trailing whitespace/newlines that
/// show up in wrapped mail bodies.
pub fn base64_decode(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut buf = [0u8; 4];
    let mut n = 0;
    let mut pad = 0;

    for c in input.bytes() {
        let val = match c {
            b'A'..=b'Z' => c - b'A',
            b'a'..=b'z' => c - b'a' + 26,
            b'0'..=b'9' => c - b'0' + 52,
            b'+' => 62,
            b'/' => 63,
            b'=' => {
                pad += 1;
                buf[n] = 0;
                n += 1;
                if n == 4 {
                    flush_quad(&mut out, &buf, pad);
                    n = 0;
                    pad = 0;
                }
                continue;
            }
            _ => continue,
        };
        buf[n] = val;
        n += 1;
        if n == 4 {
            flush_quad(&mut out, &buf, 0);
            n = 0;
        }
    }
    out
}

fn flush_quad(out: &mut Vec<u8>, buf: &[u8; 4], pad: usize) {
    let b0 = (buf[0] << 2) | (buf[1] >> 4);
    let b1 = (buf[1] << 4) | (buf[2] >> 2);
    let b2 = (buf[2] << 6) | buf[3];
    out.push(b0);
    if pad < 2 {
        out.push(b1);
    }
    if pad < 1 {
        out.push(b2);
    }
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

/// Decode quoted-printable text. `=XX` is a hex-escaped byte; a trailing
/// `=` at end of line is a soft line break (removed, no newline emitted).
pub fn quoted_printable_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                i += 2;
                continue;
            }
            if i + 2 < bytes.len() && bytes[i + 1] == b'\r' && bytes[i + 2] == b'\n' {
                i += 3;
                continue;
            }
            if i + 2 < bytes.len() {
                if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
            }
            out.push(b'=');
            i += 1;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

/// Decode a single `=?charset?enc?text?=` RFC 2047 encoded-word. Only
/// `B` (base64) and `Q` (quoted-printable-like) encodings are recognized,
/// matching `rfc2047_decode`'s dispatch. Non-ASCII charsets are not
/// transcoded — the decoded bytes are treated as UTF-8 lossily, since
/// retaining the exact original charset handling is out of scope for the
/// core match/interpolate pipeline.
fn decode_word(charset: &str, enc: &str, text: &str) -> Option<String> {
    let _ = charset;
    let bytes = match enc.to_ascii_uppercase().as_str() {
        "B" => base64_decode(text),
        "Q" => {
            // Q-encoding additionally maps `_` to a literal space.
            let underscored = text.replace('_', " ");
            quoted_printable_decode(&underscored)
        }
        _ => return None,
    };
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Replace every RFC 2047 encoded-word in `input` with its decoded text,
/// passing through anything that doesn't match the `=?...?...?...?=` shape.
pub fn rfc2047_decode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && bytes.get(i + 1) == Some(&b'?') {
            if let Some((decoded, consumed)) = try_decode_at(&input[i..]) {
                out.push_str(&decoded);
                i += consumed;
                continue;
            }
        }
        // copy one UTF-8 char's worth of bytes
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&input[i..i + ch_len.min(bytes.len() - i)]);
        i += ch_len.min(bytes.len() - i);
    }
    out
}

fn utf8_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else if lead & 0xF8 == 0xF0 {
        4
    } else {
        1
    }
}

fn try_decode_at(s: &str) -> Option<(String, usize)> {
    // s starts with "=?"
    let rest = &s[2..];
    let charset_end = rest.find('?')?;
    let charset = &rest[..charset_end];
    let rest2 = &rest[charset_end + 1..];
    let enc_end = rest2.find('?')?;
    let enc = &rest2[..enc_end];
    let rest3 = &rest2[enc_end + 1..];
    let text_end = rest3.find("?=")?;
    let text = &rest3[..text_end];
    let consumed = 2 + charset_end + 1 + enc_end + 1 + text_end + 2;
    decode_word(charset, enc, text).map(|d| (d, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip_simple() {
        // "hello" -> "aGVsbG8="
        assert_eq!(base64_decode("aGVsbG8="), b"hello");
    }

    #[test]
    fn quoted_printable_soft_break() {
        assert_eq!(quoted_printable_decode("abc=\ndef"), b"abcdef");
    }

    #[test]
    fn quoted_printable_hex_escape() {
        assert_eq!(quoted_printable_decode("caf=C3=A9"), b"caf\xc3\xa9");
    }

    #[test]
    fn rfc2047_decode_q_word() {
        assert_eq!(rfc2047_decode("=?UTF-8?Q?Hello_World?="), "Hello World");
    }

    #[test]
    fn rfc2047_decode_b_word() {
        assert_eq!(rfc2047_decode("=?UTF-8?B?aGVsbG8=?="), "hello");
    }

    #[test]
    fn rfc2047_decode_passthrough() {
        assert_eq!(rfc2047_decode("plain text"), "plain text");
    }

    #[test]
    fn rfc2047_decode_mixed() {
        assert_eq!(
            rfc2047_decode("prefix =?UTF-8?Q?mid?= suffix"),
            "prefix mid suffix"
        );
    }
}
