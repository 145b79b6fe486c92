use serde::{Deserialize, Serialize};

/// Wrapper carried by every successful transport response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Business outcome of a request, independent of the HTTP status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl Envelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            meta: Meta {
                code: code.into(),
                message: message.into(),
            },
            data,
        }
    }

    /// Successful envelope wrapping `data`.
    pub fn success(data: serde_json::Value) -> Self {
        Self::new(crate::codes::SUCCESS_CODE, "", data)
    }

    pub fn is_success(&self) -> bool {
        self.meta.code == crate::codes::SUCCESS_CODE
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Envelope;

    #[test]
    fn decodes_envelope_with_missing_fields() {
        let envelope: Envelope =
            serde_json::from_value(json!({"meta": {"code": "1024-B01"}})).expect("must decode");
        assert_eq!(envelope.meta.code, "1024-B01");
        assert!(envelope.meta.message.is_empty());
        assert!(envelope.data.is_null());
        assert!(!envelope.is_success());
    }

    #[test]
    fn success_sentinel() {
        let envelope: Envelope = serde_json::from_value(json!({
            "meta": {"code": "1024-S200", "message": "ok"},
            "data": {"id": 7}
        }))
        .expect("must decode");
        assert!(envelope.is_success());
        assert_eq!(envelope.data["id"], 7);
    }
}
