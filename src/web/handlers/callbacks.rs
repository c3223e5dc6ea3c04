//! # Worker Callback Handlers
//!
//! Workers report each batch back here. The body is decoded by hand so that a
//! malformed payload fails only its own batch instead of being rejected at the
//! extractor.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::messaging::{BatchKey, WorkerCallback};
use crate::orchestration::{CallbackOutcome, CallbackReceipt};
use crate::web::response_types::{ApiError, ApiResult};
use crate::web::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAck {
    pub accepted: bool,
    pub outcome: CallbackOutcome,
    pub completed_lines: u32,
}

impl From<CallbackReceipt> for CallbackAck {
    fn from(receipt: CallbackReceipt) -> Self {
        Self {
            accepted: true,
            outcome: receipt.outcome,
            completed_lines: receipt.completed_lines,
        }
    }
}

async fn apply(state: &AppState, session_id: &str, batch_index: u32, body: &[u8]) -> ApiResult<Json<CallbackAck>> {
    let receipt = match serde_json::from_slice::<WorkerCallback>(body) {
        Ok(callback) => {
            state
                .orchestrator
                .handle_worker_callback(session_id, batch_index, callback)
                .await?
        }
        Err(e) => {
            state
                .orchestrator
                .handle_malformed_callback(session_id, batch_index, &e.to_string())
                .await?
        }
    };
    Ok(Json(receipt.into()))
}

/// Batch callback: POST /callback/:session_id/:batch_index
pub async fn batch_callback(
    State(state): State<AppState>,
    Path((session_id, batch_index)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<CallbackAck>> {
    let batch_index: u32 = batch_index
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid batch index '{batch_index}'")))?;
    apply(&state, &session_id, batch_index, &body).await
}

/// Batch callback keyed by composite id: POST /callback/:batch_key
pub async fn keyed_batch_callback(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CallbackAck>> {
    let key: BatchKey = batch_key
        .parse()
        .map_err(|e: crate::messaging::BatchKeyError| ApiError::bad_request(e.to_string()))?;
    apply(&state, &key.session_id, key.batch_index, &body).await
}
