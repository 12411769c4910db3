//! Push payloads and the notifications built from them.

use super::errors::PushError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TITLE: &str = "Habit Reminder";
pub const DEFAULT_BODY: &str = "Time for your habit!";
pub const DEFAULT_ICON: &str = "/logo192.png";
pub const DEFAULT_TAG: &str = "habit-reminder";
pub const DEFAULT_CLICK_URL: &str = "/dashboard";
pub const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

/// `data` member of a push payload, carried into the notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,
    #[serde(
        default,
        rename = "habitId",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub habit_id: Option<String>,
    /// Unknown members are kept as sent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// JSON body of a push message. Every member is optional.
///
/// Members of the wrong type are coerced or dropped rather than failing the
/// whole payload: numbers become strings, anything else falls back to the
/// default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PushPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub badge: Option<String>,
    #[serde(default, deserialize_with = "lenient_data")]
    pub data: Option<NotificationData>,
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_data<'de, D>(deserializer: D) -> Result<Option<NotificationData>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

impl PushPayload {
    pub fn parse(bytes: &[u8]) -> Result<Self, PushError> {
        serde_json::from_slice(bytes).map_err(|e| PushError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: NotificationData,
    pub vibrate: Vec<u32>,
    /// Notifications sharing a tag replace each other
    pub tag: String,
    pub require_interaction: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

/// Empty strings count as missing.
fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Notification {
    pub fn from_payload(payload: PushPayload) -> Self {
        let data = payload.data.unwrap_or_default();
        let tag = or_default(data.habit_id.clone(), DEFAULT_TAG);

        Self {
            title: or_default(payload.title, DEFAULT_TITLE),
            options: NotificationOptions {
                body: or_default(payload.body, DEFAULT_BODY),
                icon: or_default(payload.icon, DEFAULT_ICON),
                badge: or_default(payload.badge, DEFAULT_ICON),
                data,
                vibrate: VIBRATE_PATTERN.to_vec(),
                tag,
                require_interaction: false,
            },
        }
    }

    pub fn tag(&self) -> &str {
        &self.options.tag
    }

    /// Where a click should take the user
    pub fn target_url(&self) -> &str {
        self.options
            .data
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_CLICK_URL)
    }
}

/// An open browser window the worker can focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_empty_object() {
        let n = Notification::from_payload(PushPayload::parse(b"{}").unwrap());
        assert_eq!(n.title, DEFAULT_TITLE);
        assert_eq!(n.options.body, DEFAULT_BODY);
        assert_eq!(n.options.icon, "/logo192.png");
        assert_eq!(n.options.badge, "/logo192.png");
        assert_eq!(n.options.vibrate, vec![200, 100, 200]);
        assert_eq!(n.tag(), "habit-reminder");
        assert!(!n.options.require_interaction);
        assert_eq!(n.target_url(), "/dashboard");
    }

    #[test]
    fn test_habit_id_becomes_tag() {
        let payload = PushPayload::parse(
            br#"{"title":"Read","body":"10 pages","data":{"habitId":"h-42","url":"/habits/h-42","streak":3}}"#,
        )
        .unwrap();
        let n = Notification::from_payload(payload);
        assert_eq!(n.title, "Read");
        assert_eq!(n.tag(), "h-42");
        assert_eq!(n.target_url(), "/habits/h-42");
        assert_eq!(n.options.data.extra["streak"], 3);
    }

    #[test]
    fn test_empty_strings_fall_back() {
        let payload = PushPayload::parse(br#"{"title":"","data":{"habitId":""}}"#).unwrap();
        let n = Notification::from_payload(payload);
        assert_eq!(n.title, DEFAULT_TITLE);
        assert_eq!(n.tag(), DEFAULT_TAG);
    }

    #[test]
    fn test_wrongly_typed_members_are_coerced() {
        let payload = PushPayload::parse(
            br#"{"title":7,"body":["x"],"icon":null,"data":{"habitId":42,"url":false}}"#,
        )
        .unwrap();
        let n = Notification::from_payload(payload);
        assert_eq!(n.title, "7");
        assert_eq!(n.options.body, DEFAULT_BODY);
        assert_eq!(n.options.icon, DEFAULT_ICON);
        assert_eq!(n.tag(), "42");
        assert_eq!(n.target_url(), DEFAULT_CLICK_URL);
    }

    #[test]
    fn test_non_object_data_falls_back() {
        let payload = PushPayload::parse(br#"{"title":"Walk","data":"h-1"}"#).unwrap();
        let n = Notification::from_payload(payload);
        assert_eq!(n.title, "Walk");
        assert_eq!(n.tag(), DEFAULT_TAG);
        assert_eq!(n.target_url(), DEFAULT_CLICK_URL);
        assert_eq!(n.options.data, NotificationData::default());
    }

    #[test]
    fn test_malformed_payloads() {
        for raw in [&b"not json"[..], b"", b"null", b"[1,2]"] {
            assert!(matches!(
                PushPayload::parse(raw),
                Err(PushError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_options_serialize_camel_case() {
        let n = Notification::from_payload(PushPayload::default());
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["options"]["requireInteraction"], false);
        assert_eq!(json["options"]["data"], serde_json::json!({}));
    }
}
