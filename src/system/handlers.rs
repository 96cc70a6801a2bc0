use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::config::{BridgeConfig, WhitelistEntry};
use crate::system::SystemControl;

/// Placeholder returned instead of the key store password.
pub const REDACTED: &str = "********";

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub iteration: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlReply {
    pub result: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestUserRequest {
    pub username: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestUserReply {
    pub username: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn redacted(config: &BridgeConfig) -> BridgeConfig {
    let mut config = config.clone();
    if !config.security.keystore_password.is_empty() {
        config.security.keystore_password = REDACTED.to_string();
    }
    config
}

pub async fn get_version(State(system): State<SystemControl>) -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        iteration: system.iteration(),
    })
}

pub async fn get_settings(State(system): State<SystemControl>) -> Json<BridgeConfig> {
    Json(redacted(&system.store().snapshot()))
}

pub async fn put_settings(
    State(system): State<SystemControl>,
    Json(mut incoming): Json<BridgeConfig>,
) -> Result<Json<BridgeConfig>, ApiError> {
    let current = system.store().snapshot();
    if incoming.security.keystore_password == REDACTED {
        incoming.security.keystore_password = current.security.keystore_password.clone();
    }
    if incoming.network.bridge_id.is_empty() {
        incoming.network.bridge_id = current.network.bridge_id.clone();
    }

    system.store().replace(incoming).map_err(|e| {
        tracing::warn!(error = %e, "Rejected settings update");
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })?;

    tracing::info!("Settings updated through the system API");
    Ok(Json(redacted(&system.store().snapshot())))
}

pub async fn post_reinit(State(system): State<SystemControl>) -> Json<ControlReply> {
    system.reinit();
    Json(ControlReply {
        result: "reinit requested".to_string(),
    })
}

pub async fn post_stop(State(system): State<SystemControl>) -> Json<ControlReply> {
    system.stop();
    Json(ControlReply {
        result: "stop requested".to_string(),
    })
}

/// Create an ephemeral credential. It is purged on the next run boundary.
pub async fn post_test_user(
    State(system): State<SystemControl>,
    body: Bytes,
) -> Result<Json<TestUserReply>, ApiError> {
    let request: TestUserRequest = if body.is_empty() {
        TestUserRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })?
    };
    let username = request
        .username
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let entry = WhitelistEntry {
        username: username.clone(),
        device_type: request.device_type.unwrap_or_else(|| "test".to_string()),
        test: true,
    };

    system.store().update(|config| {
        config.security.whitelist.retain(|user| user.username != entry.username);
        config.security.whitelist.push(entry);
    });
    tracing::info!(username = %username, "Test credential created");

    Ok(Json(TestUserReply { username }))
}
