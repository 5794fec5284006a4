//! Response Envelopes
//!
//! Every reply is either `{"success": true, ...}` or
//! `{"success": false, "error": {...}}`.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Machine-readable error kind plus human-readable detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Error kind, e.g. `QuotaExceededError`
    pub kind: String,

    /// Human-readable description
    pub detail: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl From<&GatewayError> for ErrorDescriptor {
    fn from(err: &GatewayError) -> Self {
        Self {
            kind: err.kind().to_string(),
            detail: err.to_string(),
            token: err.token().map(str::to_string),
            email: err.email().map(str::to_string),
            language: err.language().map(str::to_string),
        }
    }
}

/// Reply to a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResponse {
    Success {
        success: SuccessFlag,
        /// Formatted blocks, or `null` when the backend had no usable output
        result: Option<Vec<String>>,
    },
    Failure {
        success: FailureFlag,
        error: ErrorDescriptor,
    },
}

/// Reply to a registration request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegistrationResponse {
    Success { success: SuccessFlag, token: String },
    Failure {
        success: FailureFlag,
        error: ErrorDescriptor,
    },
}

/// Serializes as `true`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuccessFlag;

/// Serializes as `false`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureFlag;

macro_rules! bool_flag {
    ($ty:ty, $value:expr) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = bool::deserialize(deserializer)?;
                if value == $value {
                    Ok(Self)
                } else {
                    Err(serde::de::Error::custom(concat!(
                        "expected success = ",
                        stringify!($value)
                    )))
                }
            }
        }
    };
}

bool_flag!(SuccessFlag, true);
bool_flag!(FailureFlag, false);

impl GenerationResponse {
    pub fn success(result: Option<Vec<String>>) -> Self {
        GenerationResponse::Success {
            success: SuccessFlag,
            result,
        }
    }

    pub fn failure(err: &GatewayError) -> Self {
        GenerationResponse::Failure {
            success: FailureFlag,
            error: err.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResponse::Success { .. })
    }

    /// Error kind of a failed response
    pub fn error_kind(&self) -> Option<&str> {
        match self {
            GenerationResponse::Failure { error, .. } => Some(&error.kind),
            GenerationResponse::Success { .. } => None,
        }
    }
}

impl RegistrationResponse {
    pub fn success(token: String) -> Self {
        RegistrationResponse::Success {
            success: SuccessFlag,
            token,
        }
    }

    pub fn failure(err: &GatewayError) -> Self {
        RegistrationResponse::Failure {
            success: FailureFlag,
            error: err.into(),
        }
    }
}

impl From<Result<String, GatewayError>> for RegistrationResponse {
    fn from(result: Result<String, GatewayError>) -> Self {
        match result {
            Ok(token) => Self::success(token),
            Err(err) => Self::failure(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let response = GenerationResponse::success(Some(vec!["x = 1".to_string()]));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"success": true, "result": ["x = 1"]}));
    }

    #[test]
    fn test_rate_limited_envelope_has_null_result() {
        let value = serde_json::to_value(GenerationResponse::success(None)).unwrap();
        assert_eq!(value, json!({"success": true, "result": null}));
    }

    #[test]
    fn test_quota_failure_envelope_carries_token() {
        let err = GatewayError::QuotaExceeded {
            token: "abc".into(),
        };
        let value = serde_json::to_value(GenerationResponse::failure(&err)).unwrap();

        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["kind"], json!("QuotaExceededError"));
        assert_eq!(value["error"]["token"], json!("abc"));
        assert!(value["error"].get("email").is_none());
    }

    #[test]
    fn test_registration_envelopes() {
        let ok: RegistrationResponse = Ok("tok".to_string()).into();
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "token": "tok"})
        );

        let err: RegistrationResponse = Err(GatewayError::EmailAlreadyUsed {
            email: "a@b.c".into(),
        })
        .into();
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"]["kind"], json!("EmailAlreadyUsedError"));
        assert_eq!(value["error"]["email"], json!("a@b.c"));
    }

    #[test]
    fn test_envelope_parses_back_by_success_flag() {
        let raw = r#"{"success": false, "error": {"kind": "EmptyInputError", "detail": "Input is empty"}}"#;
        let parsed: GenerationResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.error_kind(), Some("EmptyInputError"));
        assert!(!parsed.is_success());
    }
}
