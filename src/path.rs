//! Path utilities: joining and component-indexed slicing.
//!
//! The substrate the walker and match list use to derive "current subdir"
//! and "parent maildir" from a message's absolute path.

const PATH_MAX_LEN: usize = libc::PATH_MAX as usize;

/// Concatenate `root` with `a` and, optionally, `b` using `/` separators.
/// Returns `None` if the result would not fit in a `PATH_MAX`-sized buffer.
pub fn join(root: &str, a: &str, b: Option<&str>) -> Option<String> {
    let mut out = String::with_capacity(root.len() + a.len() + 2);
    out.push_str(root);
    out.push('/');
    out.push_str(a);
    if let Some(b) = b {
        out.push('/');
        out.push_str(b);
    }
    if out.len() >= PATH_MAX_LEN {
        return None;
    }
    Some(out)
}

/// Return the substring of `path` spanning components `[beg..=end]`,
/// 0-based from the root, with negative indices counting from the tail.
///
/// A leading `/` is preserved iff `beg == 0` in an absolute path. When the
/// slice spans a single component and the path is absolute, the leading
/// separator is omitted. Returns `None` on out-of-range indices.
pub fn slice(path: &str, beg: i64, end: i64) -> Option<String> {
    let bytes = path.as_bytes();
    let mut isabs = bytes.first() == Some(&b'/');
    let mut ncomps: i64 = if isabs { 0 } else { 1 };
    for b in bytes {
        if *b == b'/' {
            ncomps += 1;
        }
    }

    let isrange = end - beg != 0;
    let mut end = end;
    let mut beg = beg;
    if end < 0 {
        end = ncomps + end - if isrange { 1 } else { 0 };
    }
    if beg < 0 {
        beg = ncomps + beg - if isrange { 1 } else { 0 };
    }
    if beg < 0 || beg > end || end < 0 || end >= ncomps {
        return None;
    }

    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut p: usize = 0;
    let mut i: i64 = 0;
    while i < ncomps {
        if p >= bytes.len() {
            break;
        }
        let docopy = i >= beg && i <= end;
        if docopy {
            if isabs && isrange {
                out.push(b'/');
            } else if !isabs {
                out.push(bytes[p]);
            }
        }
        isabs = true;
        p += 1;
        while p < bytes.len() && bytes[p] != b'/' {
            if docopy {
                out.push(bytes[p]);
            }
            p += 1;
        }
        i += 1;
    }

    String::from_utf8(out).ok()
}

/// Number of path components in `path`, counting a missing leading `/` as
/// one implicit component.
pub fn component_count(path: &str) -> i64 {
    let bytes = path.as_bytes();
    let isabs = bytes.first() == Some(&b'/');
    let mut ncomps: i64 = if isabs { 0 } else { 1 };
    for b in bytes {
        if *b == b'/' {
            ncomps += 1;
        }
    }
    ncomps
}
