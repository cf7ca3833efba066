use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use crate::error::DeliveryError;

static EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Delivery envelope: one tenant's usage payload.
///
/// Identity is the process-unique `id`, so two envelopes with identical
/// payloads are still delivered independently.
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-unique identity; the delivery queue key.
    pub id: u64,
    /// Ingestion tenant (the cluster's subaccount).
    pub tenant_key: String,
    /// JSON object produced by a polling engine.
    pub payload: Vec<u8>,
}

impl Event {
    /// Creates an envelope with a fresh id.
    pub fn new(tenant_key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: EVENT_ID.fetch_add(1, Ordering::Relaxed),
            tenant_key: tenant_key.into(),
            payload: payload.into(),
        }
    }

    /// Request body: the payload object with a `timestamp` (RFC 3339, UTC) merged in.
    pub fn body(&self) -> Result<Vec<u8>, DeliveryError> {
        let mut value: Value = serde_json::from_slice(&self.payload)
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;
        let Some(object) = value.as_object_mut() else {
            return Err(DeliveryError::Serialization(
                "payload is not a JSON object".to_string(),
            ));
        };
        object.insert(
            "timestamp".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        serde_json::to_vec(&value).map_err(|e| DeliveryError::Serialization(e.to_string()))
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_merges_timestamp_into_payload() {
        let ev = Event::new("sa-1", br#"{"compute":{"provisionedCpus":4}}"#.to_vec());
        let body: Value = serde_json::from_slice(&ev.body().unwrap()).unwrap();

        assert_eq!(body["compute"]["provisionedCpus"], 4);
        let ts = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn non_object_payloads_are_terminal() {
        for payload in [&b"not json"[..], &b"[1,2]"[..]] {
            let err = Event::new("sa-1", payload.to_vec()).body().unwrap_err();
            assert!(err.is_terminal(), "{err}");
        }
    }

    #[test]
    fn identity_is_the_id() {
        let a = Event::new("sa-1", b"{}".to_vec());
        let b = Event::new("sa-1", b"{}".to_vec());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
