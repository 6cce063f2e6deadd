//! RFC 5322-ish header storage: insertion-ordered, secondarily indexed by
//! case-folded key for binary search.
//!
//! Headers are kept in one vector in insertion order; a second
//! `Vec<usize>` holds indices sorted by case-folded key, rebuilt after each
//! mutation, which is cheap at the message sizes this crate processes.

use super::decode::rfc2047_decode;

#[derive(Debug, Clone)]
pub struct Header {
    pub id: u32,
    pub key: String,
    /// Raw value exactly as stored, still folded (may contain embedded
    /// `\n` + leading whitespace from continuation lines) and not yet
    /// RFC 2047-decoded. `get()` applies both on the way out.
    pub raw_value: String,
    dirty: bool,
}

impl Header {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

fn casefold_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Collapse fold continuations (`\n` followed by a run of spaces/tabs) into
/// a single space.
fn unfold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            while matches!(chars.peek(), Some(' ') | Some('\t')) {
                chars.next();
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct HeaderList {
    headers: Vec<Header>,
    /// Indices into `headers`, sorted by case-folded key, id as tiebreaker so
    /// a contiguous run of same-key entries stays in insertion order.
    index: Vec<usize>,
    next_id: u32,
}

impl HeaderList {
    pub fn new() -> Self {
        HeaderList::default()
    }

    /// Append a header in raw (folded, not RFC-2047-decoded) form, keeping
    /// insertion order. Rebuilds the key index.
    pub fn push_raw(&mut self, key: impl Into<String>, raw_value: impl Into<String>) {
        let id = self.next_id;
        self.next_id += 1;
        self.headers.push(Header {
            id,
            key: key.into(),
            raw_value: raw_value.into(),
            dirty: false,
        });
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        let mut idx: Vec<usize> = (0..self.headers.len()).collect();
        idx.sort_by(|&a, &b| {
            let ka = self.headers[a].key.to_ascii_lowercase();
            let kb = self.headers[b].key.to_ascii_lowercase();
            ka.cmp(&kb).then(self.headers[a].id.cmp(&self.headers[b].id))
        });
        self.index = idx;
    }

    /// All values for `key` (case-insensitive), in insertion order, unfolded
    /// and RFC 2047-decoded.
    pub fn get(&self, key: &str) -> Vec<String> {
        self.index
            .iter()
            .filter(|&&i| casefold_eq(&self.headers[i].key, key))
            .map(|&i| rfc2047_decode(&unfold(&self.headers[i].raw_value)))
            .collect()
    }

    /// The raw (folded, undecoded) value of the first occurrence of `key`,
    /// if present. Used by the inspector to locate `valbeg`/`valend` offsets
    /// against the buffer the regex actually matched.
    pub fn get_raw_first(&self, key: &str) -> Option<&str> {
        self.index
            .iter()
            .find(|&&i| casefold_eq(&self.headers[i].key, key))
            .map(|&i| self.headers[i].raw_value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.iter().any(|&i| casefold_eq(&self.headers[i].key, key))
    }

    /// Replace the first occurrence of `key` with `value`, remove later
    /// duplicates, mark the surviving cell dirty. Appends a new header if
    /// `key` was absent (serialization order follows `id`, not physical
    /// storage position, so append-on-miss is equivalent to any other slot).
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let matching: Vec<usize> = self
            .index
            .iter()
            .copied()
            .filter(|&i| casefold_eq(&self.headers[i].key, key))
            .collect();

        if let Some(&first) = matching.first() {
            self.headers[first].raw_value = value.into();
            self.headers[first].dirty = true;
            for &dup in &matching[1..] {
                self.headers[dup].dirty = true;
            }
            let mut to_remove: Vec<usize> = matching[1..].to_vec();
            to_remove.sort_unstable();
            for &i in to_remove.iter().rev() {
                self.headers.remove(i);
            }
        } else {
            let id = self.next_id;
            self.next_id += 1;
            self.headers.push(Header {
                id,
                key: key.to_string(),
                raw_value: value.into(),
                dirty: true,
            });
        }
        self.rebuild_index();
    }

    /// Iterate headers in original insertion (`id`) order, for serialization.
    pub fn iter_by_id(&self) -> impl Iterator<Item = &Header> {
        let mut v: Vec<&Header> = self.headers.iter().collect();
        v.sort_by_key(|h| h.id);
        v.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_case_insensitive_and_ordered() {
        let mut h = HeaderList::new();
        h.push_raw("To", "a@ex.com");
        h.push_raw("to", "b@ex.com");
        assert_eq!(h.get("TO"), vec!["a@ex.com", "b@ex.com"]);
    }

    #[test]
    fn unfold_collapses_continuation() {
        let mut h = HeaderList::new();
        h.push_raw("Subject", "hello\n\tworld");
        assert_eq!(h.get("Subject"), vec!["hello world"]);
    }

    #[test]
    fn set_replaces_first_and_drops_duplicates() {
        let mut h = HeaderList::new();
        h.push_raw("X-Label", "a");
        h.push_raw("X-Label", "b");
        h.set("X-Label", "c");
        assert_eq!(h.get("X-Label"), vec!["c"]);
    }

    #[test]
    fn set_appends_new_header() {
        let mut h = HeaderList::new();
        h.push_raw("Subject", "s");
        h.set("From", "me@ex.com");
        let keys: Vec<&str> = h.iter_by_id().map(|hd| hd.key.as_str()).collect();
        assert_eq!(keys, vec!["Subject", "From"]);
    }

    #[test]
    fn contains() {
        let mut h = HeaderList::new();
        h.push_raw("Date", "x");
        assert!(h.contains("date"));
        assert!(!h.contains("received"));
    }
}
