use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use saltmine_db::models::{NewUser, UserRow};
use saltmine_types::api::{
    Claims, LoginRequest, LoginResponse, SignupRequest, SignupResponse, UserSummary,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const TOKEN_TTL_DAYS: i64 = 30;
const MAX_NAME_LEN: usize = 100;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = validate_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    validate_password(&req.password)?;

    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::BadRequest("Email is already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4().to_string();
    let today = Utc::now().date_naive();

    state.db.create_user(
        &NewUser {
            id: &user_id,
            name,
            email: &email,
            password_hash: &password_hash,
        },
        today,
        state.quota.free,
    )?;

    let user = state
        .db
        .get_user_by_id(&user_id)?
        .ok_or_else(|| anyhow::anyhow!("User {} missing after signup", user_id))?;
    info!(user_id = %user_id, "User signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "Signup successful".into(),
            user: user_summary(&user)?,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::InvalidCredentials)?;

    // Accounts created through OAuth have no password
    let stored = user
        .password_hash
        .as_deref()
        .ok_or(ApiError::InvalidCredentials)?;
    if !verify_password(&req.password, stored)? {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(ApiError::InvalidCredentials);
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is disabled".into()));
    }

    let summary = user_summary(&user)?;
    let token = create_token(&state.jwt_secret, &summary)?;

    Ok(Json(LoginResponse {
        token,
        user: summary,
    }))
}

/// Issues a session token carrying the user's current tier.
pub fn create_token(secret: &str, user: &UserSummary) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        membership: user.membership_type,
        exp: (Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Loads the account behind a session. Missing accounts invalidate the
/// session; disabled ones are refused.
pub fn current_user(state: &AppState, claims: &Claims) -> ApiResult<UserRow> {
    let user = state
        .db
        .get_user_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::Unauthorized)?;
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is disabled".into()));
    }
    Ok(user)
}

pub fn user_summary(user: &UserRow) -> ApiResult<UserSummary> {
    let id = user
        .id
        .parse()
        .map_err(|_| anyhow::anyhow!("Malformed user id in database: {}", user.id))?;
    Ok(UserSummary {
        id,
        name: user.name.clone(),
        email: user.email.clone(),
        membership_type: user.effective_membership(Utc::now()),
        membership_expires_at: user.membership_expires_at.clone(),
    })
}

// -- Passwords --

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("Stored hash unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// At least 8 characters with an upper case letter, a lower case letter, a
/// digit and a symbol.
pub fn validate_password(password: &str) -> ApiResult<()> {
    let rule = |ok: bool, msg: &str| {
        if ok { Ok(()) } else { Err(ApiError::BadRequest(msg.to_string())) }
    };
    rule(password.chars().count() >= 8, "Password must be at least 8 characters")?;
    rule(
        password.chars().any(|c| c.is_ascii_uppercase()),
        "Password must contain at least one uppercase letter",
    )?;
    rule(
        password.chars().any(|c| c.is_ascii_lowercase()),
        "Password must contain at least one lowercase letter",
    )?;
    rule(
        password.chars().any(|c| c.is_ascii_digit()),
        "Password must contain at least one number",
    )?;
    rule(
        password.chars().any(|c| !c.is_ascii_alphanumeric()),
        "Password must contain at least one special character",
    )
}

pub fn validate_name(name: &str) -> ApiResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest("Name is too long".into()));
    }
    Ok(name)
}

pub(crate) fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::BadRequest("Please enter a valid email address".into()));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_policy() {
        assert!(validate_password("abc").is_err());
        assert!(validate_password("alllowercase1!").is_err());
        assert!(validate_password("ALLUPPER1!").is_err());
        assert!(validate_password("NoDigits!!").is_err());
        assert!(validate_password("NoSymbol12").is_err());
        assert!(validate_password("Str0ng!pass").is_ok());
    }

    #[test]
    fn emails_are_checked_and_normalized() {
        assert_eq!(normalize_email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("nope").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[test]
    fn hashes_verify() {
        let hash = hash_password("Str0ng!pass").unwrap();
        assert!(verify_password("Str0ng!pass", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn tokens_round_trip() {
        let summary = UserSummary {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            membership_type: saltmine_types::models::Tier::Premium,
            membership_expires_at: None,
        };
        let token = create_token("secret", &summary).unwrap();
        let claims = crate::middleware::decode_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, summary.id);
        assert_eq!(claims.membership, saltmine_types::models::Tier::Premium);
        assert!(crate::middleware::decode_token(&token, "other").is_none());
    }
}
