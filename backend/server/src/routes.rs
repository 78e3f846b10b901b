use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::info;

use crate::{
    auth::VerifiedAccount, database::DocumentStore, error::AppError, state::AppState,
    utils::get_claim,
};

#[derive(Serialize, Debug)]
pub struct ClaimResponse {
    pub granted: bool,
}

#[derive(Serialize, Debug)]
pub struct StatusResponse {
    pub admin: bool,
}

pub async fn claim_handler(
    State(state): State<Arc<AppState>>,
    account: VerifiedAccount,
    bytes: Bytes,
) -> Result<Json<ClaimResponse>, AppError> {
    let request = get_claim(&bytes)?;

    let granted = state.claims.claim(&account.id, &request.code).await?;

    if granted {
        info!(
            account = %account.id,
            email = account.email.as_deref().unwrap_or("-"),
            "admin access granted"
        );
    }

    Ok(Json(ClaimResponse { granted }))
}

pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    account: VerifiedAccount,
) -> Result<Json<StatusResponse>, AppError> {
    let admin = state.claims.is_admin(&account.id).await?;

    Ok(Json(StatusResponse { admin }))
}

pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.store.ping().await?;

    Ok((StatusCode::OK, "ok"))
}
