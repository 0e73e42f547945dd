use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Everything that can go wrong while serving an indicator or a conversion.
///
/// All variants surface to clients as `400 {status, msg}`.
#[derive(Debug, Error)]
pub enum IndicatorError {
    /// Transport failure or non-2xx answer from the indicators page.
    #[error("request to indicators page failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Markup the extractor relies on is missing.
    #[error("expected markup not found: {0}")]
    Selector(String),

    /// Upstream text that should be a number or a timestamp is not.
    #[error("malformed upstream value: {0}")]
    Parse(String),

    /// Conversion source failed or returned an unusable answer.
    #[error("currency conversion failed: {0}")]
    Conversion(String),

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),
}

impl ResponseError for IndicatorError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(json!({
            "status": status.as_u16(),
            "msg": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn every_error_maps_to_bad_request_body() {
        let err = IndicatorError::Selector("uf paragraph".into());
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], 400);
        assert_eq!(value["msg"], "expected markup not found: uf paragraph");
    }
}
