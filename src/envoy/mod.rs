pub mod client;
pub mod data_models;
pub mod endpoints;
pub mod relay_client;
