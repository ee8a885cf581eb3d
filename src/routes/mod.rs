pub mod envoy;
pub mod health;
pub mod token;

use crate::cors::{self, Cors};
use crate::state::AppState;
use rocket::{routes, Build, Rocket};
use std::sync::Arc;

/// Mount the relay surface and its shared state onto `rocket`.
pub fn mount_relay(rocket: Rocket<Build>, state: Arc<AppState>) -> Rocket<Build> {
    rocket
        .attach(Cors)
        .manage(state)
        .mount("/", health::routes())
        .mount("/", routes![cors::preflight])
        .mount("/api", token::routes())
        .mount("/api/envoy", envoy::routes())
}
