// Wire request derivation from a notification.
use apns_transport::WireRequest;
use bytes::Bytes;

use crate::notification::{Notification, PushType};

/// Path, headers, and body for one push. The body is the caller's
/// serialized payload; this layer does not interpret it.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    /// Headers are emitted only when the corresponding field is set; unset
    /// optional fields never produce empty placeholder values. A
    /// notification-level authorization override wins over the
    /// connection-supplied token, and custom headers are merged last,
    /// taking precedence over everything computed here.
    pub fn new(notification: &dyn Notification, authorization: Option<&str>) -> Self {
        let options = notification.options();
        let mut headers: Vec<(String, String)> = Vec::new();

        if let Some(id) = &options.apns_id {
            headers.push(("apns-id".to_string(), id.clone()));
        }
        if let Some(expiration) = options.expiration {
            headers.push(("apns-expiration".to_string(), expiration.to_string()));
        }
        if let Some(priority) = options.priority {
            headers.push(("apns-priority".to_string(), priority.to_string()));
        }
        if let Some(topic) = &options.topic {
            headers.push(("apns-topic".to_string(), topic.clone()));
        }
        if let Some(collapse_id) = &options.apns_collapse_id {
            headers.push(("apns-collapse-id".to_string(), collapse_id.clone()));
        }

        let push_type = options.push_type.unwrap_or_else(|| {
            if notification.background() {
                PushType::Background
            } else {
                PushType::Alert
            }
        });
        headers.push(("apns-push-type".to_string(), push_type.as_str().to_string()));

        let authorization = options.authorization.as_deref().or(authorization);
        if let Some(token) = authorization {
            headers.push(("authorization".to_string(), format!("bearer {token}")));
        }

        for (name, value) in &options.custom_headers {
            headers.retain(|(existing, _)| existing != name);
            headers.push((name.clone(), value.clone()));
        }

        Request {
            path: format!("/3/device/{}", notification.device_token()),
            headers,
            body: notification.body(),
        }
    }

    pub(crate) fn into_wire(self) -> WireRequest {
        WireRequest {
            method: http::Method::POST,
            path: self.path,
            headers: self.headers,
            body: self.body,
        }
    }
}
