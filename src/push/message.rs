//! Messages received on the push channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Server-to-client push message, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
  /// Every client must drop its whole cache.
  #[serde(rename = "cache:clear")]
  CacheClear(BroadcastEvent),
  /// Any other message type. Not handled by the cache layer.
  #[serde(other)]
  Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEvent {
  /// Informational only. Unparseable values decode as `None`.
  #[serde(
    rename = "issuedAt",
    default,
    deserialize_with = "lenient_timestamp",
    skip_serializing_if = "Option::is_none"
  )]
  pub issued_at: Option<DateTime<Utc>>,
}

/// RFC 3339 strings or epoch milliseconds; anything else is dropped.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
  D: Deserializer<'de>,
{
  let issued_at = match Option::<Value>::deserialize(deserializer)? {
    Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
      .ok()
      .map(|t| t.with_timezone(&Utc)),
    Some(Value::Number(millis)) => millis.as_i64().and_then(DateTime::from_timestamp_millis),
    _ => None,
  };
  Ok(issued_at)
}

impl PushMessage {
  pub fn decode(text: &str) -> serde_json::Result<Self> {
    serde_json::from_str(text)
  }

  pub fn cache_clear(issued_at: DateTime<Utc>) -> Self {
    PushMessage::CacheClear(BroadcastEvent {
      issued_at: Some(issued_at),
    })
  }
}
