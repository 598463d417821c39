use crate::base::neterror::NetError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::str::FromStr;

/// Request header list.
///
/// Keeps name/value pairs in insertion order with the caller's original
/// casing; lookups are case-insensitive. Names and values are validated on
/// insertion so conversion to an `http::HeaderMap` cannot fail later.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedHeaders {
    headers: Vec<(String, String)>,
}

impl OrderedHeaders {
    pub fn new() -> Self {
        Self {
            headers: Vec::new(),
        }
    }

    fn validate(name: &str, value: &str) -> Result<(), NetError> {
        HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
        HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
        Ok(())
    }

    /// Set a header, replacing the first existing entry of the same name in
    /// place (later duplicates are dropped). Appends if absent.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        Self::validate(name, value)?;

        match self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(pos) => {
                self.headers[pos].1 = value.to_string();
                let mut idx = 0;
                self.headers.retain(|(n, _)| {
                    let keep = idx <= pos || !n.eq_ignore_ascii_case(name);
                    idx += 1;
                    keep
                });
            }
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Append a header even if one with the same name exists.
    pub fn append(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        Self::validate(name, value)?;
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Remove every entry with this name.
    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Remove entries with this name whose value matches exactly.
    /// Returns true if anything was removed.
    pub fn remove_value(&mut self, name: &str, value: &str) -> bool {
        let before = self.headers.len();
        self.headers
            .retain(|(n, v)| !(n.eq_ignore_ascii_case(name) && v == value));
        before != self.headers.len()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Convert to a standard `http::HeaderMap` (names lowercased, order kept).
    pub fn to_header_map(&self) -> Result<HeaderMap, NetError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_str(name).map_err(|_| NetError::InvalidHeader)?;
            let value = HeaderValue::from_str(value).map_err(|_| NetError::InvalidHeader)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for OrderedHeaders {
    /// Pairs that fail validation are skipped.
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = OrderedHeaders::new();
        for (name, value) in iter {
            let _ = headers.append(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut headers = OrderedHeaders::new();
        headers.set("Content-Type", "application/json").unwrap();
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_case_insensitive_get() {
        let mut headers = OrderedHeaders::new();
        headers.set("ACCEPT", "text/html").unwrap();
        assert!(headers.get("accept").is_some());
        assert!(headers.get("Accept").is_some());
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut headers = OrderedHeaders::new();
        headers.set("Host", "example.com").unwrap();
        headers.set("Accept", "*/*").unwrap();
        headers.set("host", "updated.com").unwrap();

        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "Accept"]);
        assert_eq!(headers.get("Host"), Some("updated.com"));
    }

    #[test]
    fn test_set_collapses_duplicates() {
        let mut headers = OrderedHeaders::new();
        headers.append("Authorization", "Basic a").unwrap();
        headers.append("Authorization", "Basic b").unwrap();
        headers.set("Authorization", "Basic c").unwrap();
        assert_eq!(headers.get_all("authorization").collect::<Vec<_>>(), vec!["Basic c"]);
    }

    #[test]
    fn test_append_keeps_both() {
        let mut headers = OrderedHeaders::new();
        headers.append("Accept", "text/html").unwrap();
        headers.append("Accept", "text/plain").unwrap();
        assert_eq!(headers.get_all("accept").count(), 2);
    }

    #[test]
    fn test_remove_header() {
        let mut headers = OrderedHeaders::new();
        headers.set("X-Custom", "value").unwrap();
        headers.remove("x-custom");
        assert!(headers.get("X-Custom").is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_remove_value_only_matching() {
        let mut headers = OrderedHeaders::new();
        headers.set("Authorization", "Basic user").unwrap();
        assert!(!headers.remove_value("Authorization", "Basic other"));
        assert!(headers.remove_value("authorization", "Basic user"));
        assert!(!headers.contains("Authorization"));
    }

    #[test]
    fn test_preserves_insertion_order() {
        let mut headers = OrderedHeaders::new();
        headers.set("Host", "example.com").unwrap();
        headers.set("Accept", "text/html").unwrap();
        headers.set("User-Agent", "test").unwrap();

        let map = headers.to_header_map().unwrap();
        let names: Vec<_> = map.keys().collect();
        assert_eq!(names[0].as_str(), "host");
        assert_eq!(names[2].as_str(), "user-agent");
    }

    #[test]
    fn test_invalid_header_name() {
        let mut headers = OrderedHeaders::new();
        assert_eq!(
            headers.set("Invalid Header", "value"),
            Err(NetError::InvalidHeader)
        );
    }

    #[test]
    fn test_invalid_header_value() {
        let mut headers = OrderedHeaders::new();
        assert!(headers.set("Valid", "invalid\nvalue").is_err());
    }

    #[test]
    fn test_from_iter_skips_invalid() {
        let headers: OrderedHeaders = [("Accept", "*/*"), ("Bad Name", "x")]
            .into_iter()
            .collect();
        assert_eq!(headers.len(), 1);
    }
}
