use std::sync::OnceLock;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::db::{AccessToken, AccessTokenRepo, User, UserRepo};
use crate::server::AppState;

use super::error::{ApiError, ApiResult};
use super::types::UserProfile;

/// The authenticated caller, inserted into request extensions by
/// `auth_middleware` when a valid bearer token is presented.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSession>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Resolves a `Authorization: Bearer <token>` header into an `AuthSession`
/// extension. Requests without a valid token pass through unauthenticated;
/// handlers that need a user reject them with 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(token) = extract_bearer(&req) {
        if let Ok(access) = state.db.get_token(&token).await {
            if let Ok(user) = state.db.get_user_by_id(&access.user_id).await {
                if user.is_active {
                    let _ = state.db.touch_token(&token, Utc::now()).await;
                    req.extensions_mut().insert(AuthSession { user, token });
                }
            }
        }
    }

    Ok(next.run(req).await)
}

fn extract_bearer(req: &Request) -> Option<String> {
    let auth = req.headers().get(axum::http::header::AUTHORIZATION)?;
    let auth = auth.to_str().ok()?;
    auth.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{2,31}$").unwrap())
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}

/// Emails are stored and looked up lowercased, so `Bob@example.com` and
/// `bob@example.com` are the same account.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<LoginResponse>)> {
    let username = req.username.trim();
    if !username_re().is_match(username) {
        return Err(ApiError::BadRequest(
            "Username must be 3-32 characters: letters, digits, '_', '.', '-'".to_string(),
        ));
    }
    let email = normalize_email(&req.email);
    if !email_re().is_match(&email) {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::BadRequest(format!("Cannot hash password: {}", e)))?;

    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        email,
        password_hash,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        bio: String::new(),
        country: req.country.trim().to_string(),
        preferred_language: req.preferred_language.unwrap_or_else(|| "en".to_string()),
        date_of_birth: None,
        is_premium: false,
        is_active: true,
        favorite_genres: "[]".to_string(),
        diversity: 0.5,
        novelty: 0.5,
        device_token: None,
        device_type: None,
        last_login: Some(now),
        created_at: now,
        updated_at: now,
    };
    state.db.create_user(&user).await?;

    info!(username = %user.username, "Registered new user");

    let token = issue_token(&state, &user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            token,
            user: UserProfile::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let name = req.username.trim();
    let lookup = if name.contains('@') {
        state.db.get_user_by_email(&normalize_email(name)).await
    } else {
        state.db.get_user(name).await
    };
    // A missing account and a bad password answer the same way.
    let mut user = lookup.map_err(|_| ApiError::Unauthorized)?;
    if !user.is_active {
        return Err(ApiError::Unauthorized);
    }

    let ok = bcrypt::verify(&req.password, &user.password_hash).unwrap_or(false);
    if !ok {
        return Err(ApiError::Unauthorized);
    }

    user.last_login = Some(Utc::now());
    user.updated_at = Utc::now();
    state.db.update_user(&user).await?;

    let token = issue_token(&state, &user.id).await?;
    Ok(Json(LoginResponse {
        token,
        user: UserProfile::from(&user),
    }))
}

async fn issue_token(state: &AppState, user_id: &str) -> ApiResult<String> {
    let token = AccessToken {
        token: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        created_at: Utc::now(),
        last_used: None,
    };
    state.db.insert_token(&token).await?;
    Ok(token.token)
}

pub async fn logout(State(state): State<AppState>, session: AuthSession) -> ApiResult<StatusCode> {
    state.db.delete_token(&session.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(session: AuthSession) -> Json<UserProfile> {
    Json(UserProfile::from(&session.user))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub country: Option<String>,
    pub preferred_language: Option<String>,
    pub favorite_genres: Option<Vec<i64>>,
    pub diversity: Option<f64>,
    pub novelty: Option<f64>,
    pub device_token: Option<String>,
    pub device_type: Option<String>,
}

pub async fn update_me(
    State(state): State<AppState>,
    session: AuthSession,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let mut user = session.user;

    if let Some(email) = req.email {
        let email = normalize_email(&email);
        if !email_re().is_match(&email) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }
        user.email = email;
    }
    if let Some(v) = req.first_name {
        user.first_name = v;
    }
    if let Some(v) = req.last_name {
        user.last_name = v;
    }
    if let Some(v) = req.bio {
        user.bio = v;
    }
    if let Some(v) = req.country {
        user.country = v;
    }
    if let Some(v) = req.preferred_language {
        user.preferred_language = v;
    }
    if let Some(ids) = req.favorite_genres {
        user.set_favorite_genre_ids(&ids);
    }
    if let Some(v) = req.diversity {
        if !(0.0..=1.0).contains(&v) {
            return Err(ApiError::BadRequest("diversity must be in 0..=1".to_string()));
        }
        user.diversity = v;
    }
    if let Some(v) = req.novelty {
        if !(0.0..=1.0).contains(&v) {
            return Err(ApiError::BadRequest("novelty must be in 0..=1".to_string()));
        }
        user.novelty = v;
    }
    if req.device_token.is_some() {
        user.device_token = req.device_token;
    }
    if req.device_type.is_some() {
        user.device_type = req.device_type;
    }

    user.updated_at = Utc::now();
    state.db.update_user(&user).await?;
    Ok(Json(UserProfile::from(&user)))
}

pub async fn delete_me(
    State(state): State<AppState>,
    session: AuthSession,
) -> ApiResult<StatusCode> {
    state.db.delete_user(&session.user.id).await?;
    info!(username = %session.user.username, "Deleted user account");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_validation() {
        assert!(username_re().is_match("moviefan"));
        assert!(username_re().is_match("a.b-c_3"));
        assert!(!username_re().is_match("ab"));
        assert!(!username_re().is_match("-leading"));
        assert!(!username_re().is_match("has space"));
    }

    #[test]
    fn email_validation() {
        assert!(email_re().is_match("fan@example.com"));
        assert!(!email_re().is_match("fan@example"));
        assert!(!email_re().is_match("not-an-email"));
    }

    #[test]
    fn emails_are_lowercased() {
        assert_eq!(normalize_email(" Bob@Example.COM "), "bob@example.com");
        // a mixed-case registration and a lowercase login meet in the middle
        assert_eq!(
            normalize_email("Bob@example.com"),
            normalize_email("bob@EXAMPLE.com")
        );
    }
}
