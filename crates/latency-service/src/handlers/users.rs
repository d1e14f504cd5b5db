//! Demo business route.

use axum::{extract::Path, Json};
use serde::{Deserialize, Serialize};

/// Response body for `GET /users/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
}

/// Handler for GET /users/:id
///
/// Echoes the path parameter back as JSON.
pub async fn get_user(Path(id): Path<String>) -> Json<UserResponse> {
    Json(UserResponse { id })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_user_echoes_id() {
        let Json(body) = get_user(Path("42".to_string())).await;
        assert_eq!(body, UserResponse { id: "42".to_string() });
    }

    #[test]
    fn test_user_response_serialization() {
        let json = serde_json::to_string(&UserResponse {
            id: "alice".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"id":"alice"}"#);
    }
}
