//! A small ordered, case-preserving header multimap shared by [`crate::http::IncomingMessage`]
//! and [`crate::http::Response`].
//!
//! Names are stored exactly as received/set (spec §3: "case-preserving"). Lookup by name is
//! case-insensitive, matching HTTP/1.1 header-name semantics (RFC 9110 §5.1).

/// An ordered list of `(name, value)` pairs.
#[derive(Debug, Default, Clone)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `(name, value)` pair, keeping any existing entries for the same name. Used by
    /// the request parser, where duplicate header names are legal and order-preserving (spec
    /// §3's `IncomingMessage` invariant).
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Removes any existing entries matching `name` (case-insensitive) and inserts a single new
    /// entry. Used by `Response::set_header`, where setting a header replaces it (P7: retrieval
    /// returns the last value set for that key).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// Returns the value of the last entry matching `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value stored for `name` (case-insensitive), in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes every entry matching `name` (case-insensitive). Returns whether anything was
    /// removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    /// Returns true if no header has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the map.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates entries in insertion order, exactly as they will be serialized.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
