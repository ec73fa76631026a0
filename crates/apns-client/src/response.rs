// Typed view over a raw status/body pair.
use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

/// Decoded push response.
#[derive(Debug, Clone)]
pub struct Response {
    headers: HashMap<String, String>,
    body: Bytes,
}

/// The response body: JSON when parseable, the raw bytes otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw(Bytes),
}

impl Response {
    pub(crate) fn new(headers: HashMap<String, String>, body: Bytes) -> Self {
        Response { headers, body }
    }

    /// Value of the `:status` pseudo-header.
    pub fn status(&self) -> Option<&str> {
        self.headers.get(":status").map(String::as_str)
    }

    pub fn ok(&self) -> bool {
        self.status() == Some("200")
    }

    /// The `apns-id` echoed (or assigned) by the gateway.
    pub fn apns_id(&self) -> Option<&str> {
        self.headers.get("apns-id").map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Decode failures degrade to the raw bytes; they are never errors.
    pub fn body(&self) -> ResponseBody {
        match serde_json::from_slice(&self.body) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Raw(self.body.clone()),
        }
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: &str, body: &[u8]) -> Response {
        let mut headers = HashMap::new();
        headers.insert(":status".to_string(), status.to_string());
        Response::new(headers, Bytes::copy_from_slice(body))
    }

    #[test]
    fn status_comes_from_the_pseudo_header() {
        let response = response("200", b"");
        assert_eq!(response.status(), Some("200"));
        assert!(response.ok());
    }

    #[test]
    fn non_200_is_not_ok() {
        let response = response("410", br#"{"reason":"Unregistered"}"#);
        assert!(!response.ok());
        assert_eq!(
            response.body(),
            ResponseBody::Json(json!({"reason": "Unregistered"}))
        );
    }

    #[test]
    fn unparseable_body_degrades_to_raw() {
        let response = response("200", b"plain text");
        assert_eq!(
            response.body(),
            ResponseBody::Raw(Bytes::from_static(b"plain text"))
        );
        assert!(response.json().is_none());
    }

    #[test]
    fn missing_status_reads_as_none() {
        let response = Response::new(HashMap::new(), Bytes::new());
        assert_eq!(response.status(), None);
        assert!(!response.ok());
    }
}
