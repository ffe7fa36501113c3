//! Header multimap with case-insensitive names.

use std::fmt;

/// Ordered header multimap.
///
/// Names compare case-insensitively; the first spelling seen is kept for
/// serialization. Values for a name keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Add a value, keeping any existing values for the name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace all values for the name with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = vec![value.into()],
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// First value for the name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .and_then(|i| self.entries[i].1.first())
            .map(String::as_str)
    }

    /// All values for the name, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Remove every value for the name. Returns the removed values.
    pub fn remove(&mut self, name: &str) -> Vec<String> {
        match self.position(name) {
            Some(i) => self.entries.remove(i).1,
            None => Vec::new(),
        }
    }

    /// Iterate `(name, value)` pairs, one per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(n, vs)| vs.iter().map(move |v| (n.as_str(), v.as_str())))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wire form: one `Name: value\r\n` line per value.
impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{}: {}\r\n", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert!(headers.contains("CONTENT-TYPE"));
    }

    #[test]
    fn append_keeps_order_and_set_replaces() {
        let mut headers = HeaderMap::new();
        headers.append("Accept", "a");
        headers.append("accept", "b");
        assert_eq!(headers.get_all("ACCEPT"), &["a".to_string(), "b".to_string()]);
        assert_eq!(headers.len(), 1);

        headers.set("Accept", "c");
        assert_eq!(headers.get_all("accept"), &["c".to_string()]);
    }

    #[test]
    fn display_emits_one_line_per_value() {
        let mut headers = HeaderMap::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        headers.append("Server", "rest-server");
        assert_eq!(
            headers.to_string(),
            "Set-Cookie: a=1\r\nSet-Cookie: b=2\r\nServer: rest-server\r\n"
        );
    }

    #[test]
    fn remove_returns_values() {
        let mut headers = HeaderMap::new();
        headers.append("X-A", "1");
        assert_eq!(headers.remove("x-a"), vec!["1".to_string()]);
        assert!(headers.is_empty());
        assert!(headers.remove("x-a").is_empty());
    }
}
