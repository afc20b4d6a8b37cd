//! Request guards applied ahead of the upload handler.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, warn};

use super::AppState;
use crate::admission::OVERLOAD_MESSAGE;
use crate::auth::AuthError;

/// Turn requests away with 429 while the host is under load.
pub async fn enforce_admission(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.gate.should_admit() {
        next.run(request).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, OVERLOAD_MESSAGE).into_response()
    }
}

/// Require Basic credentials when authentication is configured.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(auth) = state.auth.clone() else {
        return next.run(request).await;
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let verdict = tokio::task::spawn_blocking(move || auth.verify_header(header.as_deref())).await;

    match verdict {
        Ok(Ok(())) => next.run(request).await,
        Ok(Err(AuthError::Hash(e))) => {
            error!("Configured password hash is unusable: {}", e);
            unauthorized()
        }
        Ok(Err(e)) => {
            warn!("Unauthorized access attempt: {}", e);
            unauthorized()
        }
        Err(e) => {
            error!("Credential check failed: {}", e);
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "Basic realm=\"upload-gate\"")],
        Json(serde_json::json!({ "message": "Unauthorized" })),
    )
        .into_response()
}
