use actix_web::web;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::{Id, NewUser, UpdateUser, User};
use crate::password::{hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::repo::{Repo, RepoError, UserRepo};

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Minimal identity echoed back by signup and login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: Id,
    pub full_name: String,
    pub email: String,
}

impl From<&User> for AccountSummary {
    fn from(u: &User) -> Self {
        Self { id: u.id, full_name: u.full_name.clone(), email: u.email.clone() }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub async fn register(repo: &dyn Repo, req: SignupRequest) -> Result<User, ApiError> {
    let full_name = req.full_name.trim().to_string();
    let email = normalize_email(&req.email);
    if full_name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Please provide all required fields"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let password = req.password;
    let password_hash = web::block(move || hash_password(&password))
        .await
        .map_err(blocking_failed)?
        .map_err(|e| {
            log::error!("password hashing failed: {e}");
            ApiError::Internal
        })?;
    let user = repo
        .create_user(NewUser { full_name, email, password_hash })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::bad_request("User with this email already exists"),
            other => other.into(),
        })?;
    log::info!("registered user {}", user.id);
    Ok(user)
}

/// Unknown email and wrong password are indistinguishable to the caller.
pub async fn login(repo: &dyn Repo, req: LoginRequest) -> Result<User, ApiError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Please provide email and password"));
    }
    let (user, stored) = match repo.find_credentials(&email).await {
        Ok(found) => found,
        Err(RepoError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };
    let password = req.password;
    let matches = web::block(move || verify_password(&password, &stored)).await.map_err(blocking_failed)?;
    if !matches {
        return Err(ApiError::InvalidCredentials);
    }
    Ok(user)
}

pub async fn current_user(repo: &dyn Repo, id: Id) -> Result<User, ApiError> {
    repo.get_user(id).await.map_err(user_not_found)
}

pub async fn update_profile(repo: &dyn Repo, id: Id, mut upd: UpdateUser) -> Result<User, ApiError> {
    if let Some(name) = upd.full_name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::bad_request("Full name cannot be empty"));
        }
    }
    repo.update_user(id, upd).await.map_err(user_not_found)
}

fn blocking_failed(e: actix_web::error::BlockingError) -> ApiError {
    log::error!("password task failed: {e}");
    ApiError::Internal
}

fn user_not_found(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::not_found("User not found"),
        other => other.into(),
    }
}
