//! An insertion-order-preserving, case-insensitive-lookup key/value map,
//! used for both request headers and request/response query+form
//! parameters (spec §3: "insertion order preserved").

#[derive(Debug, Clone, Default)]
pub struct OrderedParams {
    entries: Vec<(String, String)>,
}

impl OrderedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Case-insensitive lookup of the first matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace every existing entry for `key` (case-insensitive) with a
    /// single new entry, preserving the position of the first match, or
    /// appending if absent. Used by the response writer, which needs to
    /// set-or-overwrite rather than append.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut p = OrderedParams::new();
        p.insert("Content-Type", "text/html");
        assert_eq!(p.get("content-type"), Some("text/html"));
        assert_eq!(p.get("CONTENT-TYPE"), Some("text/html"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut p = OrderedParams::new();
        p.insert("b", "2");
        p.insert("a", "1");
        let keys: Vec<_> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut p = OrderedParams::new();
        p.insert("a", "1");
        p.insert("b", "2");
        p.set("a", "99");
        assert_eq!(p.get("a"), Some("99"));
        let keys: Vec<_> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
