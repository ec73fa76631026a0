// Notification payload modeling: alert and MDM shapes.
use bytes::Bytes;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Value of the `apns-push-type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushType {
    Alert,
    Background,
    Voip,
    Complication,
    FileProvider,
    Mdm,
    LiveActivity,
}

impl PushType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushType::Alert => "alert",
            PushType::Background => "background",
            PushType::Voip => "voip",
            PushType::Complication => "complication",
            PushType::FileProvider => "fileprovider",
            PushType::Mdm => "mdm",
            PushType::LiveActivity => "liveactivity",
        }
    }
}

/// Wire-level options shared by every notification shape. A header is
/// emitted only when the corresponding field is set.
#[derive(Debug, Clone, Default)]
pub struct NotificationOptions {
    pub apns_id: Option<String>,
    /// Epoch seconds after which the gateway discards the notification.
    pub expiration: Option<u64>,
    pub priority: Option<u32>,
    pub topic: Option<String>,
    pub apns_collapse_id: Option<String>,
    /// Explicit override; when unset the push type is classified from the
    /// payload.
    pub push_type: Option<PushType>,
    /// Per-notification bearer token, overriding the connection's.
    pub authorization: Option<String>,
    /// Merged last, taking precedence over every computed header.
    pub custom_headers: Vec<(String, String)>,
}

impl NotificationOptions {
    fn with_generated_id() -> Self {
        NotificationOptions {
            apns_id: Some(Uuid::new_v4().to_string()),
            ..NotificationOptions::default()
        }
    }
}

/// A deliverable notification: an opaque device token, wire options, and a
/// JSON payload. The payload is serialized once per push and treated as
/// opaque bytes from there on.
pub trait Notification: Send + Sync {
    fn device_token(&self) -> &str;

    fn options(&self) -> &NotificationOptions;

    fn payload(&self) -> Value;

    /// Whether the payload classifies as a background delivery. Only the
    /// alert shape can; everything else is an alert push unless overridden.
    fn background(&self) -> bool {
        false
    }

    fn body(&self) -> Bytes {
        Bytes::from(self.payload().to_string())
    }
}

/// The standard alert-style payload: an `aps` object built from the set
/// fields, with any custom payload merged at the top level.
#[derive(Debug, Clone)]
pub struct AlertNotification {
    device_token: String,
    pub options: NotificationOptions,
    pub alert: Option<Value>,
    pub badge: Option<u32>,
    pub sound: Option<Value>,
    pub category: Option<String>,
    pub content_available: Option<i64>,
    pub url_args: Option<Vec<String>>,
    pub mutable_content: Option<i64>,
    pub thread_id: Option<String>,
    pub custom_payload: Option<Map<String, Value>>,
}

impl AlertNotification {
    /// A new notification with a generated `apns-id`.
    pub fn new(device_token: impl Into<String>) -> Self {
        AlertNotification {
            device_token: device_token.into(),
            options: NotificationOptions::with_generated_id(),
            alert: None,
            badge: None,
            sound: None,
            category: None,
            content_available: None,
            url_args: None,
            mutable_content: None,
            thread_id: None,
            custom_payload: None,
        }
    }

    fn aps(&self) -> Map<String, Value> {
        let mut aps = Map::new();
        if let Some(alert) = &self.alert {
            aps.insert("alert".to_string(), alert.clone());
        }
        if let Some(badge) = self.badge {
            aps.insert("badge".to_string(), Value::from(badge));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), sound.clone());
        }
        if let Some(category) = &self.category {
            aps.insert("category".to_string(), Value::from(category.clone()));
        }
        if let Some(content_available) = self.content_available {
            aps.insert(
                "content-available".to_string(),
                Value::from(content_available),
            );
        }
        if let Some(url_args) = &self.url_args {
            aps.insert("url-args".to_string(), Value::from(url_args.clone()));
        }
        if let Some(mutable_content) = self.mutable_content {
            aps.insert("mutable-content".to_string(), Value::from(mutable_content));
        }
        if let Some(thread_id) = &self.thread_id {
            aps.insert("thread-id".to_string(), Value::from(thread_id.clone()));
        }
        aps
    }
}

impl Notification for AlertNotification {
    fn device_token(&self) -> &str {
        &self.device_token
    }

    fn options(&self) -> &NotificationOptions {
        &self.options
    }

    fn payload(&self) -> Value {
        let mut root = Map::new();
        root.insert("aps".to_string(), Value::Object(self.aps()));
        if let Some(custom) = &self.custom_payload {
            for (key, value) in custom {
                root.insert(key.clone(), value.clone());
            }
        }
        Value::Object(root)
    }

    /// Background iff the built `aps` object is exactly
    /// `{"content-available": 1}`; any other field, or any other value,
    /// makes it an alert.
    fn background(&self) -> bool {
        let aps = self.aps();
        aps.len() == 1
            && aps
                .get("content-available")
                .map(|value| value == &Value::from(1))
                .unwrap_or(false)
    }
}

/// MDM wake-up notification: `{"mdm": push_magic}`.
#[derive(Debug, Clone)]
pub struct MdmNotification {
    device_token: String,
    pub options: NotificationOptions,
    push_magic: String,
}

impl MdmNotification {
    pub fn new(device_token: impl Into<String>, push_magic: impl Into<String>) -> Self {
        MdmNotification {
            device_token: device_token.into(),
            options: NotificationOptions::with_generated_id(),
            push_magic: push_magic.into(),
        }
    }

    pub fn push_magic(&self) -> &str {
        &self.push_magic
    }
}

impl Notification for MdmNotification {
    fn device_token(&self) -> &str {
        &self.device_token
    }

    fn options(&self) -> &NotificationOptions {
        &self.options
    }

    fn payload(&self) -> Value {
        let mut root = Map::new();
        root.insert("mdm".to_string(), Value::from(self.push_magic.clone()));
        Value::Object(root)
    }
}
