use axum::body::Bytes;
use serde::Deserialize;

use crate::error::AppError;

/// Codes are short, anything bigger is not a claim request.
const MAX_PAYLOAD_BYTES: usize = 1024;

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ClaimRequest {
    pub code: String,
}

pub fn get_claim(bytes: &Bytes) -> Result<ClaimRequest, AppError> {
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(AppError::MalformedPayload);
    }

    // serde accepts a struct as a positional array, only a JSON object is a claim
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|_| AppError::MalformedPayload)?;
    if !value.is_object() {
        return Err(AppError::MalformedPayload);
    }

    serde_json::from_value(value).map_err(|_| AppError::MalformedPayload)
}
