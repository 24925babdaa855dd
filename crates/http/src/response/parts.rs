use bytes::{Bytes, BytesMut};
use http::{HeaderName, HeaderValue, StatusCode};
use tracing::warn;

use crate::protocol::{try_header_pair, HeaderTable, ResponseHead};

/// The mutable assembly of a response: status, headers and the buffered
/// body bytes not yet handed to the transport.
///
/// This is the only surface filters and handlers can mutate. Once the
/// head has been emitted the status and headers freeze: further mutation
/// is a defined no-op that logs a warning, never undefined output.
#[derive(Debug)]
pub struct ResponseParts {
    status: StatusCode,
    headers: HeaderTable,
    body: BytesMut,
    frozen: bool,
}

impl ResponseParts {
    pub(crate) fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderTable::new(), body: BytesMut::new(), frozen: false }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        if self.frozen {
            warn!(%status, "ignoring status change after head emission");
            return;
        }
        self.status = status;
    }

    /// Appends a header, keeping earlier entries for the same name.
    pub fn add_header<K, V>(&mut self, name: K, value: V)
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if self.frozen {
            warn!("ignoring header mutation after head emission");
            return;
        }
        if let Some((name, value)) = try_header_pair(name, value) {
            self.headers.add(name, value);
        }
    }

    /// Replaces all entries for a name with a single value.
    pub fn set_header<K, V>(&mut self, name: K, value: V)
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if self.frozen {
            warn!("ignoring header mutation after head emission");
            return;
        }
        if let Some((name, value)) = try_header_pair(name, value) {
            self.headers.set(name, value);
        }
    }

    /// The first value stored for `name`.
    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    /// The body bytes buffered for the next flush.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn append_body(&mut self, chunk: impl AsRef<[u8]>) {
        self.body.extend_from_slice(chunk.as_ref());
    }

    /// Replaces the buffered body wholesale; body-phase filters use this
    /// to rewrite a flush before the transport sees it.
    pub fn replace_body(&mut self, body: impl AsRef<[u8]>) {
        self.body.clear();
        self.body.extend_from_slice(body.as_ref());
    }

    pub(crate) fn has_buffered_body(&self) -> bool {
        !self.body.is_empty()
    }

    pub(crate) fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }

    pub(crate) fn clear_body(&mut self) {
        self.body.clear();
    }

    /// Freezes status and headers, producing the head the transport sees.
    pub(crate) fn freeze_head(&mut self) -> ResponseHead {
        self.frozen = true;
        ResponseHead::new(self.status, self.headers.clone())
    }

    #[cfg(test)]
    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen
    }
}
