use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    authz::UserAccess,
    error::Error,
    identity::{IdentityStore, UserId},
    ledger::{AdminPackUpdate, CheckIn, MailRequest, Pack, PackId, PackLedger, PackStatus, PickUp},
    util::FlexibleId,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PackResponse {
    pub pack: Pack,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub packs: Vec<Pack>,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn mail(
    State(ledger): State<Arc<PackLedger>>,
    access: UserAccess,
    request: Result<Json<MailRequest>, JsonRejection>,
) -> Result<Json<PackResponse>, Error> {
    let Json(request) = request?;

    let pack = ledger.send(&access, request)?;

    Ok(Json(PackResponse { pack }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CancelRequest {
    pub pack_id: FlexibleId,
    pub user_id: FlexibleId,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn cancel(
    State(ledger): State<Arc<PackLedger>>,
    access: UserAccess,
    request: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<PackResponse>, Error> {
    let Json(request) = request?;

    let pack = ledger.cancel(&access, request.pack_id.into(), request.user_id.into())?;

    Ok(Json(PackResponse { pack }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckInRequest {
    pub pack_id: FlexibleId,
    pub user_id: FlexibleId,
    pub shelf_code: FlexibleId,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn check_in(
    State(ledger): State<Arc<PackLedger>>,
    State(identity): State<Arc<IdentityStore>>,
    access: UserAccess,
    request: Result<Json<CheckInRequest>, JsonRejection>,
) -> Result<Json<PackResponse>, Error> {
    let Json(request) = request?;

    let pack = ledger.check_in(
        &access,
        &identity,
        CheckIn {
            pack_id: request.pack_id.into(),
            user_id: request.user_id.into(),
            shelf_code: request.shelf_code.into(),
        },
    )?;

    Ok(Json(PackResponse { pack }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckOutRequest {
    pub pack_id: FlexibleId,
    pub user_id: FlexibleId,
    pub pickup_code: String,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn check_out(
    State(ledger): State<Arc<PackLedger>>,
    access: UserAccess,
    request: Result<Json<CheckOutRequest>, JsonRejection>,
) -> Result<Json<PackResponse>, Error> {
    let Json(request) = request?;

    let pack = ledger.pick_up(
        &access,
        PickUp {
            pack_id: request.pack_id.into(),
            user_id: request.user_id.into(),
            pickup_code: request.pickup_code,
        },
    )?;

    Ok(Json(PackResponse { pack }))
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn index_for_user(
    State(ledger): State<Arc<PackLedger>>,
    access: UserAccess,
    path: Result<Path<UserId>, PathRejection>,
) -> Result<Json<IndexResponse>, Error> {
    let Path(user_id) = path?;

    let packs = ledger.list_for_user(&access, user_id)?;

    Ok(Json(IndexResponse { packs }))
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn show(
    State(ledger): State<Arc<PackLedger>>,
    access: UserAccess,
    path: Result<Path<PackId>, PathRejection>,
) -> Result<Json<PackResponse>, Error> {
    let Path(pack_id) = path?;

    let pack = ledger.get(&access, pack_id)?;

    Ok(Json(PackResponse { pack }))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PackFilter {
    pub status: Option<PackStatus>,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn admin_index(
    State(ledger): State<Arc<PackLedger>>,
    access: UserAccess,
    filter: Result<Query<PackFilter>, QueryRejection>,
) -> Result<Json<IndexResponse>, Error> {
    let Query(filter) = filter?;

    let packs = ledger.list_all(&access, filter.status)?;

    Ok(Json(IndexResponse { packs }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdminUpdateRequest {
    pub pack_id: FlexibleId,
    pub pack_status: Option<PackStatus>,
    pub pickup_code: Option<String>,
    pub user_id: Option<FlexibleId>,
}

#[tracing::instrument(skip_all, fields(user_id = access.id))]
pub async fn admin_update(
    State(ledger): State<Arc<PackLedger>>,
    State(identity): State<Arc<IdentityStore>>,
    access: UserAccess,
    request: Result<Json<AdminUpdateRequest>, JsonRejection>,
) -> Result<Json<PackResponse>, Error> {
    let Json(request) = request?;

    let pack = ledger.admin_set(
        &access,
        &identity,
        AdminPackUpdate {
            pack_id: request.pack_id.into(),
            pack_status: request.pack_status,
            pickup_code: request.pickup_code,
            user_id: request.user_id.map(Into::into),
        },
    )?;

    Ok(Json(PackResponse { pack }))
}
