use std::sync::Arc;

use argon2::Argon2;
use axum::{
    extract::FromRef,
    routing::{get, post, put},
    Router,
};

use crate::{
    api::v1::{auth, pack, user},
    config::Config,
    identity::IdentityStore,
    ledger::PackLedger,
    token::JwtState,
    util::IdGenerator,
};

#[derive(FromRef, Clone)]
pub struct AppState {
    pub identity: Arc<IdentityStore>,
    pub ledger: Arc<PackLedger>,
}

impl AppState {
    pub fn new(config: &Config, argon: Argon2<'static>) -> Self {
        let ids = Arc::new(IdGenerator::new(config.node_id));
        let jwt_state = JwtState::new(config.jwt_secret.as_bytes());

        Self {
            identity: Arc::new(IdentityStore::new(
                argon,
                jwt_state,
                ids.clone(),
                config.token_ttl,
            )),
            ledger: Arc::new(PackLedger::new(ids)),
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    let admin = Router::new()
        .route("/users", get(user::index))
        .route("/packs", get(pack::admin_index))
        .route("/pack", put(pack::admin_update));

    Router::new()
        .route("/ping", get(auth::ping))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/updateUserInfo", post(user::update))
        .route("/mailPack", post(pack::mail))
        .route("/cancelMail", post(pack::cancel))
        .route("/packCheckIn", post(pack::check_in))
        .route("/packCheckout", post(pack::check_out))
        .route("/allPacks/:user_id", get(pack::index_for_user))
        .route("/getPackDetails/:pack_id", get(pack::show))
        .nest("/admin", admin)
        .with_state(app_state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
