use crate::extractor::AuthUser;
use crate::users::{PgUserStore, User, UserStore};
use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::error;
use crate::error::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

pub fn routes() -> Router {
    Router::new()
        .route("/api/register", post(register_user))
        .route("/api/login", post(login_user))
        .route("/api/logout", post(logout_user))
        .route("/api/me", get(current_user))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct Claims {
    sub: i32,
    exp: usize,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn register_user(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<StatusCode> {
    let email = normalize_email(&payload.email);
    if !email.contains('@') {
        return Err(AppError::BadRequest("Valid email required".into()));
    }
    if payload.password.len() < 8 {
        return Err(AppError::BadRequest("Password too short".into()));
    }
    let name = payload
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|e| AppError::Message(format!("Hashing failed: {}", e)))?;
    let result = sqlx::query("INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3)")
        .bind(&email)
        .bind(name)
        .bind(hash.to_string())
        .execute(&pool)
        .await;
    match result {
        Ok(_) => Ok(StatusCode::CREATED),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("users_email_key") {
                    return Err(AppError::Conflict("Email already registered".into()));
                }
            }
            Err(AppError::Db(e))
        }
    }
}

pub async fn login_user(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, &'static str)> {
    let rec = sqlx::query("SELECT id, password_hash FROM users WHERE email = $1")
        .bind(normalize_email(&payload.email))
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            error!(?e, "DB error while fetching user");
            AppError::Db(e)
        })?;
    let rec = rec.ok_or(AppError::Unauthorized)?;
    let id: i32 = rec.get("id");
    let pass_hash: String = rec.get("password_hash");
    let parsed = PasswordHash::new(&pass_hash).map_err(|e| {
        error!(?e, "Hash parse error");
        AppError::Message(format!("Hash error: {}", e))
    })?;
    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed)
        .is_err()
    {
        return Err(AppError::Unauthorized);
    }
    let exp = (Utc::now() + Duration::hours(24)).timestamp() as usize;
    let claims = Claims { sub: id, exp };
    let secret = crate::config::JWT_SECRET.as_str();
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!(?e, "Token encoding error");
        AppError::Message("Token error".into())
    })?;
    let cookie = format!("auth_token={token}; HttpOnly; Secure; SameSite=Strict; Path=/")
        .parse()
        .map_err(|_| AppError::Message("Token error".into()))?;
    let mut headers = HeaderMap::new();
    headers.insert(axum::http::header::SET_COOKIE, cookie);
    Ok((headers, "Login successful"))
}

pub async fn logout_user() -> (HeaderMap, &'static str) {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::SET_COOKIE,
        axum::http::HeaderValue::from_static("auth_token=deleted; HttpOnly; Path=/; Max-Age=0"),
    );
    (headers, "Logged out")
}

pub async fn current_user(
    AuthUser { user_id }: AuthUser,
    Extension(pool): Extension<PgPool>,
) -> AppResult<Json<User>> {
    let user = PgUserStore::new(pool)
        .find_user(user_id)
        .await
        .map_err(|e| {
            error!(?e, "DB error while fetching user");
            AppError::Db(e)
        })?
        .ok_or(AppError::NotFound)?;
    Ok(Json(user))
}
