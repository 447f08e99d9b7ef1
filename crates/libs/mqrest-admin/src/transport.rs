use crate::error::MqRestError;
use serde_json::Value as JsonValue;
use std::time::Duration;

#[cfg(feature = "http-transport")]
pub mod http;

/// Raw HTTP outcome. Non-2xx statuses are still responses; the session
/// decides what they mean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl TransportResponse {
    pub fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self { status_code, body: body.into(), headers: Vec::new() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The seam between a session and the network.
pub trait Transport: Send + Sync {
    /// POSTs `payload` as JSON. Only failures to exchange a response at all
    /// are errors.
    fn post_json(
        &self,
        url: &str,
        payload: &JsonValue,
        headers: &[(String, String)],
        timeout: Option<Duration>,
        verify_tls: bool,
    ) -> Result<TransportResponse, MqRestError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post_json(
        &self,
        url: &str,
        payload: &JsonValue,
        headers: &[(String, String)],
        timeout: Option<Duration>,
        verify_tls: bool,
    ) -> Result<TransportResponse, MqRestError> {
        (**self).post_json(url, payload, headers, timeout, verify_tls)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn post_json(
        &self,
        url: &str,
        payload: &JsonValue,
        headers: &[(String, String)],
        timeout: Option<Duration>,
        verify_tls: bool,
    ) -> Result<TransportResponse, MqRestError> {
        (**self).post_json(url, payload, headers, timeout, verify_tls)
    }
}
