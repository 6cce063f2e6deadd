//! The `${name}` macro table, scoped to `ACTION` context.
//!
//! A config-parse-time `DEFAULT` context belongs to a parser sitting above
//! this crate; the only macro table built here is the `ACTION` one resolved
//! during interpolation, with `path` as its sole predefined entry.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    entries: HashMap<String, String>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    /// Build the per-message `ACTION` table: `path` is the message's
    /// current absolute path.
    pub fn for_message(path: &str) -> Self {
        let mut table = MacroTable::new();
        table.insert("path", path);
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|s| s.as_str())
    }
}

/// Scan `s` starting at a `$` for a well-formed `${name}` token. Returns
/// `(name, consumed_len)` on a properly terminated, non-empty name, or
/// `None` if the token is empty or never closes.
pub fn scan_macro(s: &str) -> Option<(&str, usize)> {
    let rest = s.strip_prefix("${")?;
    let end = rest.find('}')?;
    if end == 0 {
        return None;
    }
    Some((&rest[..end], 2 + end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_macro_basic() {
        assert_eq!(scan_macro("${path}/tail"), Some(("path", 7)));
    }

    #[test]
    fn scan_macro_empty_name_rejected() {
        assert_eq!(scan_macro("${}"), None);
    }

    #[test]
    fn scan_macro_unterminated_rejected() {
        assert_eq!(scan_macro("${path"), None);
    }

    #[test]
    fn for_message_predefines_path() {
        let t = MacroTable::for_message("/a/b/c");
        assert_eq!(t.get("path"), Some("/a/b/c"));
        assert_eq!(t.get("other"), None);
    }
}
