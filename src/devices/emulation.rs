//! Hub API emulation routes.
//!
//! Controllers pair by creating a user, then list and switch lights. Errors
//! use the hub's in-band error objects with a 200 status.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{SettingsStore, WhitelistEntry};
use crate::devices::{HomeError, HomeSet, Light};

const ERROR_UNAUTHORIZED: u16 = 1;
const ERROR_INVALID_JSON: u16 = 2;
const ERROR_NOT_AVAILABLE: u16 = 3;
const ERROR_INTERNAL: u16 = 901;

#[derive(Clone)]
struct EmulationState {
    homes: HomeSet,
    store: Arc<SettingsStore>,
}

impl EmulationState {
    fn authorized(&self, user: &str) -> bool {
        self.store.snapshot().security.is_whitelisted(user)
    }
}

#[derive(Debug, Deserialize)]
struct CreateUser {
    devicetype: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StateChange {
    on: Option<bool>,
}

/// Emulation routes bound to this run's devices.
pub fn routes(homes: HomeSet, store: Arc<SettingsStore>) -> Router {
    Router::new()
        .route("/api", post(create_user))
        .route("/api/{user}/lights", get(list_lights))
        .route("/api/{user}/lights/{id}", get(get_light))
        .route("/api/{user}/lights/{id}/state", put(set_light_state))
        .with_state(EmulationState { homes, store })
}

fn hub_error(kind: u16, address: &str, description: &str) -> Json<Value> {
    Json(json!([{
        "error": { "type": kind, "address": address, "description": description }
    }]))
}

fn light_json(light: &Light) -> Value {
    json!({
        "state": light.state,
        "type": "On/off light",
        "name": light.config.name,
        "modelid": "HABridge",
        "uniqueid": format!("00:17:88:5e:d3:{:0>2}-0b", light.config.id),
    })
}

async fn create_user(State(state): State<EmulationState>, body: String) -> Json<Value> {
    let request: CreateUser = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => return hub_error(ERROR_INVALID_JSON, "/", &format!("body contains invalid json: {e}")),
    };

    let username = request
        .username
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    if !state.authorized(&username) {
        let entry = WhitelistEntry {
            username: username.clone(),
            device_type: request.devicetype.clone(),
            test: false,
        };
        state.store.update(|config| config.security.whitelist.push(entry));
        tracing::info!(username = %username, device_type = %request.devicetype, "Paired new user");
    }

    Json(json!([{ "success": { "username": username } }]))
}

async fn list_lights(
    State(state): State<EmulationState>,
    Path(user): Path<String>,
) -> Json<Value> {
    if !state.authorized(&user) {
        return hub_error(ERROR_UNAUTHORIZED, "/lights", "unauthorized user");
    }

    let lights: BTreeMap<String, Value> = state
        .homes
        .lights()
        .iter()
        .map(|light| (light.config.id.clone(), light_json(light)))
        .collect();
    Json(json!(lights))
}

async fn get_light(
    State(state): State<EmulationState>,
    Path((user, id)): Path<(String, String)>,
) -> Json<Value> {
    if !state.authorized(&user) {
        return hub_error(ERROR_UNAUTHORIZED, &format!("/lights/{id}"), "unauthorized user");
    }

    match state.homes.light(&id) {
        Some(light) => Json(light_json(&light)),
        None => hub_error(
            ERROR_NOT_AVAILABLE,
            &format!("/lights/{id}"),
            &format!("resource, /lights/{id}, not available"),
        ),
    }
}

async fn set_light_state(
    State(state): State<EmulationState>,
    Path((user, id)): Path<(String, String)>,
    body: String,
) -> Json<Value> {
    let address = format!("/lights/{id}/state");
    if !state.authorized(&user) {
        return hub_error(ERROR_UNAUTHORIZED, &address, "unauthorized user");
    }

    let on = match serde_json::from_str::<StateChange>(&body) {
        Ok(StateChange { on: Some(on) }) => on,
        Ok(StateChange { on: None }) => {
            return hub_error(ERROR_INVALID_JSON, &address, "body is missing the on parameter")
        }
        Err(e) => {
            return hub_error(ERROR_INVALID_JSON, &address, &format!("body contains invalid json: {e}"))
        }
    };

    match state.homes.set_on(&id, on).await {
        Ok(_) => {
            let mut success = serde_json::Map::new();
            success.insert(format!("{address}/on"), Value::Bool(on));
            Json(json!([{ "success": success }]))
        }
        Err(HomeError::UnknownLight(_)) => hub_error(
            ERROR_NOT_AVAILABLE,
            &address,
            &format!("resource, /lights/{id}, not available"),
        ),
        Err(e) => {
            tracing::warn!(light = %id, error = %e, "Device request failed");
            hub_error(ERROR_INTERNAL, &address, &e.to_string())
        }
    }
}
