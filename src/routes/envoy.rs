use crate::envoy::data_models::{LiveData, Panel, StreamResponse};
use crate::error::EnvoyError;
use crate::models::ConnectionResponse;
use crate::state::AppState;
use log::warn;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, routes, State};
use std::sync::Arc;

fn forward_error(action: &str, e: EnvoyError) -> Custom<String> {
    let status = match e {
        EnvoyError::Unauthorized => Status::Unauthorized,
        EnvoyError::Timeout => Status::GatewayTimeout,
        _ => Status::InternalServerError,
    };
    if status != Status::Unauthorized {
        warn!(target: "app", "Error {}: {}", action, e);
    }
    Custom(status, format!("Error {}: {}", action, e))
}

#[get("/panels")]
async fn get_panels(state: &State<Arc<AppState>>) -> Result<Json<Vec<Panel>>, Custom<String>> {
    state
        .envoy_client
        .fetch_panels()
        .await
        .map(Json)
        .map_err(|e| forward_error("fetching panels", e))
}

#[get("/livedata")]
async fn get_live_data(state: &State<Arc<AppState>>) -> Result<Json<LiveData>, Custom<String>> {
    state
        .envoy_client
        .fetch_live_data()
        .await
        .map(Json)
        .map_err(|e| forward_error("fetching live data", e))
}

#[post("/stream")]
async fn enable_stream(
    state: &State<Arc<AppState>>,
) -> Result<Json<StreamResponse>, Custom<String>> {
    state
        .envoy_client
        .request_stream()
        .await
        .map(Json)
        .map_err(|e| forward_error("enabling stream", e))
}

#[get("/test")]
async fn test_connection(state: &State<Arc<AppState>>) -> Json<ConnectionResponse> {
    Json(ConnectionResponse {
        connected: state.envoy_client.test_connection().await,
    })
}

pub fn routes() -> Vec<rocket::Route> {
    routes![get_panels, get_live_data, enable_stream, test_connection]
}
