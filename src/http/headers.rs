//! An ordered, case-insensitive HTTP header map.
//!
//! `append` coalesces repeated headers into one comma-separated value per
//! RFC 7230 §3.2.2, matching `websocketpp::http::parser::parser::append_header`.
//! Order of first appearance is preserved because some callers (the raw
//! serializer) want a stable, predictable wire representation.

#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap::default()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Case-insensitive lookup. Returns `""` if the header is absent,
    /// matching the original's `get_header` contract.
    pub fn get(&self, name: &str) -> &str {
        self.find(name).map(|i| self.entries[i].1.as_str()).unwrap_or("")
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Appends a value, coalescing with any existing value for `name` using
    /// `", "` as the separator.
    pub fn append(&mut self, name: &str, value: &str) {
        match self.find(name) {
            Some(i) => {
                let existing = &mut self.entries[i].1;
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Overwrites any existing value(s) for `name`.
    pub fn replace(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.entries.push((name.to_string(), value.to_string()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Case-insensitive substring test used for `Connection`/`Upgrade`
    /// token checks (e.g. `Connection: keep-alive, Upgrade`).
    pub fn contains_token_ci(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .split(',')
            .any(|part| part.trim().eq_ignore_ascii_case(token))
    }
}
