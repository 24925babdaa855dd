//! Core protocol types for the response delivery engine.
//!
//! This module holds the data model the engine works with:
//!
//! - **Headers** ([`headers`]): ordered, multi-valued header storage with
//!   case-insensitive names, and the frozen [`ResponseHead`] handed to
//!   the transport at head emission.
//! - **Requests** ([`request`]): the parsed-request wrapper the
//!   transport provides; the engine never parses wire bytes itself.
//! - **Errors** ([`error`]): the small set of errors that can cross the
//!   response channel.
//!
//! The state machine that moves these types around lives in
//! [`crate::response`].

mod headers;
pub use headers::HeaderTable;
pub use headers::ResponseHead;
pub(crate) use headers::try_header_pair;

mod request;
pub use request::RequestInfo;

mod error;
pub use error::ProtocolError;
