//! # Identity
//!
//! Accounts are authenticated by the gateway in front of this server, which forwards the
//! verified identity as headers along with a shared gateway token. Anything not carrying the
//! token did not come through the gateway and is rejected. The identity itself is trusted as
//! given.
use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use registry::AccountId;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{error::AppError, state::AppState};

pub const GATEWAY_TOKEN_HEADER: &str = "x-gateway-token";
pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ACCOUNT_EMAIL_HEADER: &str = "x-account-email";

#[derive(Debug, Clone)]
pub struct VerifiedAccount {
    pub id: AccountId,
    pub email: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for VerifiedAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = header(parts, GATEWAY_TOKEN_HEADER).ok_or(AppError::Unauthenticated)?;

        let expected = state.config.gateway_token.as_bytes();
        if !bool::from(token.as_bytes().ct_eq(expected)) {
            warn!("Rejected request with invalid gateway token");
            return Err(AppError::Unauthenticated);
        }

        let id = header(parts, ACCOUNT_ID_HEADER)
            .filter(|id| !id.is_empty())
            .ok_or(AppError::Unauthenticated)?;

        Ok(Self {
            id: AccountId::new(id),
            email: header(parts, ACCOUNT_EMAIL_HEADER)
                .filter(|email| !email.is_empty())
                .map(str::to_string),
        })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name)?.to_str().ok().map(str::trim)
}
