use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Success body shared by every endpoint: `{http_status, success, message, data}`.
/// Failures use the same shape via `AppError`'s `IntoResponse`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: String,
    data: T,
}

#[derive(Serialize)]
struct Body<'a, T> {
    http_status: u16,
    success: bool,
    message: &'a str,
    data: &'a T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self { status: StatusCode::OK, message: message.into(), data }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self { status: StatusCode::CREATED, message: message.into(), data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Body {
            http_status: self.status.as_u16(),
            success: true,
            message: &self.message,
            data: &self.data,
        };
        (self.status, Json(body)).into_response()
    }
}

/// A window of a larger listing.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_envelope_shape() {
        let response = ApiResponse::created("Result created", serde_json::json!({"result_id": 7})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["http_status"], 201);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Result created");
        assert_eq!(body["data"]["result_id"], 7);
    }
}
