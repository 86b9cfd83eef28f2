use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use etra_db::Database;
use etra_gateway::dispatcher::Dispatcher;
use etra_types::AllowList;
use etra_types::api::{
    Claims, ErrorBody, INVALID_CREDENTIALS, LoginRequest, LoginResponse, SessionResponse,
};

use crate::with_db;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub allow_list: AllowList,
}

type AuthError = (StatusCode, Json<ErrorBody>);

fn auth_error(status: StatusCode, message: &str) -> AuthError {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    // Same gate the client applies, repeated here so the server never
    // depends on the client behaving.
    if !state.allow_list.is_allowed_email(&req.email) {
        warn!("Rejected login for non-allowed email");
        return Err(auth_error(StatusCode::FORBIDDEN, "This account is not allowed"));
    }

    let email = req.email.to_lowercase();
    let internal = |_| auth_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error");

    let row = with_db(&state, move |db| db.get_user_by_email(&email))
        .await
        .map_err(internal)?
        .ok_or_else(|| auth_error(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS))?;

    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|_| auth_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| auth_error(StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS))?;

    let user = row
        .into_user()
        .map_err(|_| auth_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)
        .map_err(|_| auth_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))?;

    info!("{} logged in", user.email);
    Ok(Json(LoginResponse { user, token }))
}

/// GET /auth/session: resolves the bearer token back to its user.
pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let id = claims.sub.to_string();
    let row = with_db(&state, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let user = row.into_user().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(SessionResponse { user }))
}

/// POST /auth/logout: tokens are stateless, so there is nothing to revoke
/// server-side; the client drops its copy.
pub async fn logout(Extension(claims): Extension<Claims>) -> StatusCode {
    info!("{} logged out", claims.email);
    StatusCode::NO_CONTENT
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Hash a password with Argon2id for storage.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}
