//! HTTP API handlers
//!
//! Handlers never read engine state directly. Each query is queued as an
//! `EngineCommand` and answered by the poll loop through a oneshot.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use crossbeam_channel::TrySendError;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::protocol::{EngineCommand, StatusReport};
use crate::sequence::SequenceMetadata;
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::error(msg)))
}

/// Queue a command and wait for the poll loop's answer
async fn ask<T>(
    state: &AppState,
    command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
) -> Result<T, ApiError> {
    let (tx, rx) = oneshot::channel();
    match state.commands.try_send(command(tx)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "engine busy"));
        }
        Err(TrySendError::Disconnected(_)) => {
            return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "engine stopped"));
        }
    }
    rx.await
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "engine dropped the request"))
}

#[derive(Debug, Deserialize)]
pub struct FppJsonQuery {
    pub command: String,
    #[serde(rename = "advancedView", default)]
    pub advanced_view: bool,
}

/// Leader-compatible JSON queries
pub async fn fpp_json(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FppJsonQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let value = match query.command.as_str() {
        "getFPPstatus" => {
            let advanced = query.advanced_view;
            let report = ask(&state, |reply| EngineCommand::Status { advanced, reply }).await?;
            serde_json::to_value(report)
        }
        "getSysInfo" => {
            let info = ask(&state, |reply| EngineCommand::SysInfo { reply }).await?;
            serde_json::to_value(info)
        }
        "getHostNameInfo" => {
            let info = ask(&state, |reply| EngineCommand::HostNameInfo { reply }).await?;
            serde_json::to_value(info)
        }
        other => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("unknown command '{}'", other),
            ));
        }
    };

    value
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Metadata document for one sequence
pub async fn get_sequence_meta(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SequenceMetadata>, ApiError> {
    let metadata = ask(&state, |reply| EngineCommand::Metadata {
        name: name.clone(),
        reply,
    })
    .await?;
    metadata
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no metadata for '{}'", name)))
}

/// Playback status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StatusReport>>, ApiError> {
    let report = ask(&state, |reply| EngineCommand::Status { advanced: false, reply }).await?;
    Ok(Json(ApiResponse::ok(report)))
}
