use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Id;
use crate::routes::AppState;

pub const AUTH_COOKIE: &str = "auth_token";
pub const TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// Issues and checks the identity token carried in the auth cookie.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    secure_cookie: bool,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            secure_cookie,
        }
    }

    pub fn issue(&self, user_id: Id) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::days(TOKEN_TTL_DAYS);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Signature and expiry check. Any failure is reported as `None`.
    pub fn verify(&self, token: &str) -> Option<Id> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation).ok()?;
        data.claims.sub.parse().ok()
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(AUTH_COOKIE, token)
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Strict)
            .max_age(time::Duration::days(TOKEN_TTL_DAYS))
            .path("/")
            .finish()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut c = Cookie::build(AUTH_COOKIE, "")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Strict)
            .path("/")
            .finish();
        c.make_removal();
        c
    }
}

/// Identity of the caller, or `None` when the cookie is absent or invalid.
pub fn authenticate(req: &HttpRequest) -> Option<Id> {
    let state = req.app_data::<web::Data<AppState>>()?;
    let cookie = req.cookie(AUTH_COOKIE)?;
    state.tokens.verify(cookie.value())
}

/// Extractor yielding the authenticated user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Auth(pub Id);

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        ready(authenticate(req).map(Auth).ok_or(ApiError::Unauthorized))
    }
}
