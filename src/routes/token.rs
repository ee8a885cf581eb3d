use log::info;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::{self, Json};
use rocket::State;
use rocket::{delete, get, post, put, routes};
use std::sync::Arc;

use crate::models::{ProxyStatusResponse, TokenRequest, TokenResponse};
use crate::state::AppState;

type TokenBody<'r> = Result<Json<TokenRequest>, json::Error<'r>>;

fn store_token(body: TokenBody<'_>, state: &AppState) -> Custom<Json<TokenResponse>> {
    let request = match body {
        Ok(request) => request.into_inner(),
        Err(e) => {
            return Custom(
                Status::BadRequest,
                Json(TokenResponse::failed(format!("Invalid request body: {}", e))),
            )
        }
    };

    match state.tokens.set_token(request.token.unwrap_or_default()) {
        Ok(()) => {
            info!(target: "app", "Token updated");
            Custom(Status::Ok, Json(TokenResponse::ok("Token set successfully")))
        }
        Err(e) => Custom(Status::BadRequest, Json(TokenResponse::failed(e.to_string()))),
    }
}

#[post("/token", data = "<body>")]
pub fn set_token(body: TokenBody<'_>, state: &State<Arc<AppState>>) -> Custom<Json<TokenResponse>> {
    store_token(body, state)
}

#[put("/token", data = "<body>")]
pub fn put_token(body: TokenBody<'_>, state: &State<Arc<AppState>>) -> Custom<Json<TokenResponse>> {
    store_token(body, state)
}

#[get("/token/status")]
pub fn token_status(state: &State<Arc<AppState>>) -> Json<ProxyStatusResponse> {
    Json(state.status())
}

#[delete("/token")]
pub fn clear_token(state: &State<Arc<AppState>>) -> Json<TokenResponse> {
    state.tokens.clear_token();
    info!(target: "app", "Token cleared");
    Json(TokenResponse::ok("Token cleared"))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![set_token, put_token, token_status, clear_token]
}
