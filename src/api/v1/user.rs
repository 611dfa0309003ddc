use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    authz::UserAccess,
    error::Error,
    identity::{IdentityStore, ProfileUpdate, User},
    util::FlexibleId,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub users: Vec<User>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateRequest {
    pub user_id: FlexibleId,
    pub user_name: Option<String>,
    pub address: Option<String>,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn update(
    State(identity): State<Arc<IdentityStore>>,
    access: UserAccess,
    request: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, Error> {
    let Json(request) = request?;

    let user = identity.update_profile(
        &access,
        request.user_id.into(),
        ProfileUpdate {
            user_name: request.user_name,
            address: request.address,
        },
    )?;

    Ok(Json(UserResponse { user }))
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn index(
    State(identity): State<Arc<IdentityStore>>,
    access: UserAccess,
) -> Result<Json<IndexResponse>, Error> {
    let users = identity.list_users(&access)?;

    Ok(Json(IndexResponse { users }))
}
