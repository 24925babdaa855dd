//! Ordered response header storage.
//!
//! `http::HeaderMap` groups values by name and does not promise a global
//! insertion order, so the response engine keeps its own table: a plain
//! ordered sequence of `(name, value)` pairs. Names keep their
//! case-insensitive identity through [`HeaderName`], duplicates are
//! allowed, and iteration yields entries exactly in insertion order.

use http::{HeaderName, HeaderValue, StatusCode};
use tracing::warn;

/// Ordered, multi-valued header storage with case-insensitive names.
#[derive(Debug, Clone, Default)]
pub struct HeaderTable {
    entries: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry, keeping any previous entries for the same name.
    pub fn add(&mut self, name: HeaderName, value: HeaderValue) {
        self.entries.push((name, value));
    }

    /// Removes all entries for `name`, then appends the new one.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.remove(&name);
        self.entries.push((name, value));
    }

    /// Returns the first value stored for `name`.
    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Removes every entry for `name`, returning how many were dropped.
    pub fn remove(&mut self, name: &HeaderName) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        before - self.entries.len()
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.get(name).is_some()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, HeaderValue)> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a HeaderTable {
    type Item = &'a (HeaderName, HeaderValue);
    type IntoIter = std::slice::Iter<'a, (HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for HeaderTable {
    type Item = (HeaderName, HeaderValue);
    type IntoIter = std::vec::IntoIter<(HeaderName, HeaderValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// The frozen head of a response: status plus the header table as it
/// stood when head-phase filters finished running.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderTable,
}

impl ResponseHead {
    pub fn new(status: StatusCode, headers: HeaderTable) -> Self {
        Self { status, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    pub fn into_parts(self) -> (StatusCode, HeaderTable) {
        (self.status, self.headers)
    }

    /// The announced body length, if a valid `Content-Length` is present.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(&http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
    }
}

/// Converts loosely typed header pairs, logging and discarding invalid ones.
///
/// Mutating a response must never panic inside a handler or filter, so a
/// name or value that fails conversion is dropped with a warning instead.
pub(crate) fn try_header_pair<K, V>(name: K, value: V) -> Option<(HeaderName, HeaderValue)>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let name = match HeaderName::try_from(name).map_err(Into::into) {
        Ok(name) => name,
        Err(e) => {
            warn!("discarding header with invalid name: {}", e);
            return None;
        }
    };
    let value = match HeaderValue::try_from(value).map_err(Into::into) {
        Ok(value) => value,
        Err(e) => {
            warn!(header = %name, "discarding header with invalid value: {}", e);
            return None;
        }
    };
    Some((name, value))
}
