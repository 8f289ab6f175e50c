//! Wire format for API messages.
//!
//! One JSON object per message, tagged by `type`. Size limits are checked
//! before parsing and after encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::{
    CombinedAnalysis, EmotionAnalysisResult, PhiDetectionResult, SafetyAnalysisResult,
    SafetyVerdict,
};
use crate::auth::{Claims, ClientMetadata, PublicProfile, Role, TokenPair};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Body shared by every analysis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    /// Bearer access token.
    pub token: String,
    pub content: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_context: Option<serde_json::Value>,
    /// `detect`, `redact` or `encrypt`. PHI and combined requests only.
    #[serde(default)]
    pub analysis_mode: Option<String>,
}

impl AnalysisRequest {
    pub fn new(token: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id: None,
            token: token.into(),
            content: content.into(),
            user_id: None,
            session_id: None,
            user_context: None,
            analysis_mode: None,
        }
    }

    pub fn validate(&self, max_content_chars: usize) -> Result<(), ProtocolError> {
        if self.token.trim().is_empty() {
            return Err(ProtocolError::MissingField("token".into()));
        }
        if self.content.trim().is_empty() {
            return Err(ProtocolError::MissingField("content".into()));
        }
        let chars = self.content.chars().count();
        if chars > max_content_chars {
            return Err(ProtocolError::InvalidFormat(format!(
                "content is {} characters (max {})",
                chars, max_content_chars
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Defaults to `resident`.
    #[serde(default)]
    pub role: Option<Role>,
    /// Required to register anything other than a self-service role.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginMessage {
    #[serde(default)]
    pub request_id: Option<String>,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub client: Option<ClientMetadata>,
}

/// Error body returned for every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(code: u16, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: request_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// All API message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiMessage {
    #[serde(rename = "analyze_safety")]
    AnalyzeSafety(AnalysisRequest),

    #[serde(rename = "analyze_emotion")]
    AnalyzeEmotion(AnalysisRequest),

    #[serde(rename = "detect_phi")]
    DetectPhi(AnalysisRequest),

    #[serde(rename = "analyze_combined")]
    AnalyzeCombined(AnalysisRequest),

    #[serde(rename = "register")]
    Register(RegisterMessage),

    #[serde(rename = "login")]
    Login(LoginMessage),

    #[serde(rename = "verify_token")]
    VerifyToken {
        #[serde(default)]
        request_id: Option<String>,
        token: String,
    },

    #[serde(rename = "refresh_token")]
    RefreshToken {
        #[serde(default)]
        request_id: Option<String>,
        refresh_token: String,
    },

    #[serde(rename = "logout")]
    Logout {
        #[serde(default)]
        request_id: Option<String>,
        token: String,
        #[serde(default)]
        all_sessions: bool,
    },

    #[serde(rename = "safety_result")]
    SafetyResult {
        request_id: String,
        result: SafetyAnalysisResult,
    },

    #[serde(rename = "emotion_result")]
    EmotionResult {
        request_id: String,
        result: EmotionAnalysisResult,
    },

    #[serde(rename = "phi_result")]
    PhiResult {
        request_id: String,
        result: PhiDetectionResult,
    },

    #[serde(rename = "combined_result")]
    CombinedResult {
        request_id: String,
        verdict: SafetyVerdict,
        result: CombinedAnalysis,
    },

    #[serde(rename = "registered")]
    Registered {
        request_id: String,
        code: u16,
        profile: PublicProfile,
    },

    #[serde(rename = "logged_in")]
    LoggedIn {
        request_id: String,
        profile: PublicProfile,
        session_id: Uuid,
        tokens: TokenPair,
    },

    /// `valid = false` for any token the service rejects.
    #[serde(rename = "token_verification")]
    TokenVerification {
        request_id: String,
        valid: bool,
        #[serde(default)]
        claims: Option<Claims>,
    },

    #[serde(rename = "token_refreshed")]
    TokenRefreshed {
        request_id: String,
        access_token: String,
        token_type: String,
        expires_in: u64,
    },

    #[serde(rename = "logged_out")]
    LoggedOut {
        request_id: String,
        sessions_revoked: usize,
    },

    #[serde(rename = "error")]
    Error(ErrorResponse),
}

impl ApiMessage {
    /// Wire name of the message type.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::AnalyzeSafety(_) => "analyze_safety",
            Self::AnalyzeEmotion(_) => "analyze_emotion",
            Self::DetectPhi(_) => "detect_phi",
            Self::AnalyzeCombined(_) => "analyze_combined",
            Self::Register(_) => "register",
            Self::Login(_) => "login",
            Self::VerifyToken { .. } => "verify_token",
            Self::RefreshToken { .. } => "refresh_token",
            Self::Logout { .. } => "logout",
            Self::SafetyResult { .. } => "safety_result",
            Self::EmotionResult { .. } => "emotion_result",
            Self::PhiResult { .. } => "phi_result",
            Self::CombinedResult { .. } => "combined_result",
            Self::Registered { .. } => "registered",
            Self::LoggedIn { .. } => "logged_in",
            Self::TokenVerification { .. } => "token_verification",
            Self::TokenRefreshed { .. } => "token_refreshed",
            Self::LoggedOut { .. } => "logged_out",
            Self::Error(_) => "error",
        }
    }

    /// Caller-supplied request id, if any.
    pub fn request_id(&self) -> Option<&str> {
        let id = match self {
            Self::AnalyzeSafety(r)
            | Self::AnalyzeEmotion(r)
            | Self::DetectPhi(r)
            | Self::AnalyzeCombined(r) => r.request_id.as_deref(),
            Self::Register(r) => r.request_id.as_deref(),
            Self::Login(r) => r.request_id.as_deref(),
            Self::VerifyToken { request_id, .. }
            | Self::RefreshToken { request_id, .. }
            | Self::Logout { request_id, .. } => request_id.as_deref(),
            Self::SafetyResult { request_id, .. }
            | Self::EmotionResult { request_id, .. }
            | Self::PhiResult { request_id, .. }
            | Self::CombinedResult { request_id, .. }
            | Self::Registered { request_id, .. }
            | Self::LoggedIn { request_id, .. }
            | Self::TokenVerification { request_id, .. }
            | Self::TokenRefreshed { request_id, .. }
            | Self::LoggedOut { request_id, .. } => Some(request_id.as_str()),
            Self::Error(e) => Some(e.request_id.as_str()),
        };
        id.filter(|id| !id.is_empty())
    }

    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::AnalyzeSafety(_)
                | Self::AnalyzeEmotion(_)
                | Self::DetectPhi(_)
                | Self::AnalyzeCombined(_)
                | Self::Register(_)
                | Self::Login(_)
                | Self::VerifyToken { .. }
                | Self::RefreshToken { .. }
                | Self::Logout { .. }
        )
    }
}

/// Encode with a size limit.
pub fn encode_message(message: &ApiMessage, max_size: usize) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: max_size,
        });
    }
    Ok(bytes)
}

/// Encode a response. An oversized response becomes a 413 error response.
pub fn encode_response(message: &ApiMessage, max_size: usize) -> Result<Vec<u8>, ProtocolError> {
    match encode_message(message, max_size) {
        Err(ProtocolError::MessageTooLarge { size, max }) => {
            let request_id = message.request_id().unwrap_or_default().to_string();
            let error = ApiMessage::Error(ErrorResponse::new(
                413,
                format!("Response too large: {} bytes (max {})", size, max),
                request_id,
            ));
            serde_json::to_vec(&error).map_err(ProtocolError::from)
        }
        other => other,
    }
}

/// Decode with a size limit. Size is checked before parsing.
pub fn decode_message(bytes: &[u8], max_size: usize) -> Result<ApiMessage, ProtocolError> {
    if bytes.len() > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: max_size,
        });
    }
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let raw = br#"{"type":"detect_phi","token":"t","content":"SSN 123-45-6789","analysis_mode":"redact"}"#;
        let decoded = decode_message(raw, DEFAULT_MAX_MESSAGE_SIZE).unwrap();

        match &decoded {
            ApiMessage::DetectPhi(req) => {
                assert_eq!(req.analysis_mode.as_deref(), Some("redact"));
                assert!(req.request_id.is_none());
                assert!(req.user_context.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(decoded.operation(), "detect_phi");
        assert!(decoded.is_request());
        assert_eq!(decoded.request_id(), None);
    }

    #[test]
    fn test_logout_defaults_to_single_session() {
        let raw = br#"{"type":"logout","request_id":"r-1","token":"abc"}"#;
        let decoded = decode_message(raw, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(
            decoded,
            ApiMessage::Logout {
                request_id: Some("r-1".into()),
                token: "abc".into(),
                all_sessions: false
            }
        );
        assert_eq!(decoded.request_id(), Some("r-1"));
    }

    #[test]
    fn test_error_response_shape() {
        let msg = ApiMessage::Error(ErrorResponse::new(401, "Invalid credentials", "r-9"));
        let bytes = encode_message(&msg, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], 401);
        assert_eq!(value["message"], "Invalid credentials");
        assert_eq!(value["request_id"], "r-9");
        assert!(value["timestamp"].is_string());
        assert!(!msg.is_request());
    }

    #[test]
    fn test_decode_rejects_oversized_before_parsing() {
        let junk = vec![b'{'; 5000];
        let err = decode_message(&junk, 4096).unwrap_err();
        assert!(matches!(err, ProtocolError::MessageTooLarge { size: 5000, max: 4096 }));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = br#"{"type":"drop_tables"}"#;
        assert!(matches!(
            decode_message(raw, DEFAULT_MAX_MESSAGE_SIZE),
            Err(ProtocolError::Serialization(_))
        ));
    }

    #[test]
    fn test_oversized_response_becomes_413() {
        let msg = ApiMessage::Error(ErrorResponse::new(500, "x".repeat(10_000), "r-2"));
        let bytes = encode_response(&msg, 4096).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["code"], 413);
        assert_eq!(value["request_id"], "r-2");
    }

    #[test]
    fn test_content_validation() {
        let mut req = AnalysisRequest::new("token", "hello");
        assert!(req.validate(10).is_ok());

        req.content = "   ".into();
        assert!(matches!(req.validate(10), Err(ProtocolError::MissingField(f)) if f == "content"));

        req.content = "é".repeat(11);
        assert!(matches!(req.validate(10), Err(ProtocolError::InvalidFormat(_))));

        req.content = "é".repeat(10);
        assert!(req.validate(10).is_ok());

        req.token = String::new();
        assert!(matches!(req.validate(10), Err(ProtocolError::MissingField(f)) if f == "token"));
    }
}
