//! API Models
//!
//! Response bodies of the plain HTTP routes, documented with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const SERVICE_NAME: &str = "jarvis-ai-service";

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct BannerResponse {
    #[schema(example = "Jarvis AI Service")]
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "jarvis-ai-service")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Number of live voice sessions.
    pub active_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let health = HealthResponse {
            status: "healthy".to_string(),
            service: SERVICE_NAME.to_string(),
            version: "0.1.0".to_string(),
            active_sessions: 2,
        };

        let json = serde_json::to_string(&health).unwrap();
        assert_eq!(
            json,
            r#"{"status":"healthy","service":"jarvis-ai-service","version":"0.1.0","active_sessions":2}"#
        );
    }

    #[test]
    fn test_banner_response_deserialization() {
        let banner: BannerResponse =
            serde_json::from_str(r#"{"message": "Jarvis AI Service"}"#).unwrap();
        assert_eq!(banner.message, "Jarvis AI Service");
    }
}
