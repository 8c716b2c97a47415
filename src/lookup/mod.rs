//! Client network metadata (ISP, public IP, location) for a result.

pub mod client;
pub mod meta;

pub use client::LookupClient;

use http::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Method;
use serde::Deserialize;
use std::borrow::Cow;

/// A call against the metadata service: where it goes and what the JSON
/// body decodes into.
pub trait Request {
    type Response: for<'de> Deserialize<'de>;

    const METHOD: Method = Method::GET;

    fn endpoint(&self) -> Cow<'_, str>;

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(crate::speedtest::http::UA),
        );
        headers
    }
}
