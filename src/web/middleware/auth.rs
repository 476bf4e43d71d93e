use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::warn;

use crate::db::services::user_service;
use crate::services::auth_service;
use crate::web::models::AuthenticatedUser;
use crate::web::{AppState, error::AppError};

fn bearer_token(req: &Request<AxumBody>) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Token "))
        .map(|token| token.trim().to_string())
}

/// Resolves the current user when a token is presented.
///
/// Requests without a token pass through anonymously; handlers that need
/// a user reject them through the `AuthenticatedUser` extractor. A token
/// that fails verification, or names a user that no longer exists, is
/// rejected here with 401.
pub async fn auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    // Try to get token from Authorization header first, then fall back to cookie
    let token = bearer_token(&req).or_else(|| jar.get("token").map(|c| c.value().to_string()));

    if let Some(token) = token {
        let claims = auth_service::decode_token(&token, &state.config.jwt_secret).map_err(|e| {
            warn!(error = ?e, "JWT decoding error during auth middleware.");
            AppError::Unauthorized("Invalid token.".to_string())
        })?;

        let user = user_service::get_user(&state.db_pool, claims.user_id)
            .await
            .map_err(|e| match e {
                user_service::UserError::NotFound(user_id) => {
                    warn!(user_id, "Token refers to an unknown user.");
                    AppError::Unauthorized("Invalid token.".to_string())
                }
                other => other.into(),
            })?;

        req.extensions_mut().insert(AuthenticatedUser {
            id: user.id,
            username: user.username,
        });
    }

    Ok(next.run(req).await)
}
