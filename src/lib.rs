pub mod config;
pub mod cors;
pub mod envoy;
pub mod error;
pub mod models;
pub mod polling;
pub mod routes;
pub mod session;
pub mod state;
pub mod token;
