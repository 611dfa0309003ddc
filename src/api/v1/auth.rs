use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRef, FromRequestParts, State},
    headers::{authorization::Bearer, Authorization},
    http::request::Parts,
    Json, RequestPartsExt, TypedHeader,
};
use serde::{Deserialize, Serialize};
use tap::TapFallible;

use crate::{
    authz::UserAccess,
    error::{Error, UnauthorizedType},
    identity::{IdentityStore, NewUser, SignedIn, User},
};

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserAccess
where
    Arc<IdentityStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(token)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::Unauthorized(UnauthorizedType::MissingAccessToken))
            .tap_err(|_| tracing::debug!("bearer token not found"))?;

        let identity = Arc::<IdentityStore>::from_ref(state);

        identity.authenticate(token.token())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

impl From<SignedIn> for AuthResponse {
    fn from(value: SignedIn) -> Self {
        Self {
            user: value.user,
            access_token: value.access_token,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "pong".to_string(),
    })
}

// argon2 is deliberately slow, keep it off the async workers
#[tracing::instrument(skip_all)]
pub async fn register(
    State(identity): State<Arc<IdentityStore>>,
    request: Result<Json<NewUser>, JsonRejection>,
) -> Result<Json<AuthResponse>, Error> {
    let Json(request) = request?;

    tokio::task::spawn_blocking(move || identity.register(request))
        .await?
        .map(|it| Json(it.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub student_id: String,
    pub password: String,
}

#[tracing::instrument(skip_all)]
pub async fn login(
    State(identity): State<Arc<IdentityStore>>,
    request: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, Error> {
    let Json(request) = request?;

    tokio::task::spawn_blocking(move || identity.login(&request.student_id, &request.password))
        .await?
        .map(|it| Json(it.into()))
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn logout(
    State(identity): State<Arc<IdentityStore>>,
    access: UserAccess,
) -> Result<Json<MessageResponse>, Error> {
    identity.logout(&access)?;

    Ok(Json(MessageResponse {
        message: "logged out".to_string(),
    }))
}
