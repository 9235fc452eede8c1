//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": match self.status {
                    StatusCode::BAD_REQUEST => "invalid_request_error",
                    StatusCode::SERVICE_UNAVAILABLE => "unavailable_error",
                    StatusCode::GATEWAY_TIMEOUT => "timeout_error",
                    _ => "server_error",
                },
                "param": null,
                "code": self.status.as_str()
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<glossa_core::Error> for ApiError {
    fn from(err: glossa_core::Error) -> Self {
        if err.is_client_error() {
            ApiError::bad_request(err.to_string())
        } else {
            ApiError::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_core_errors_to_status() {
        let unsupported = ApiError::from(glossa_core::Error::UnsupportedLanguage {
            lang: "de".to_string(),
            supported: vec!["en".to_string()],
        });
        assert_eq!(unsupported.status, StatusCode::BAD_REQUEST);

        let unavailable = ApiError::from(glossa_core::Error::ModelUnavailable {
            model_id: "dslim/bert-base-NER".to_string(),
            reason: "not installed".to_string(),
            hint: "Run: glossa-server pull dslim/bert-base-NER".to_string(),
        });
        assert_eq!(unavailable.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(unavailable.message.contains("glossa-server pull"));

        let inference = ApiError::from(glossa_core::Error::InferenceError("boom".to_string()));
        assert_eq!(inference.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
