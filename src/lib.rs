pub mod analysis;
pub mod clients;
pub mod config;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod orchestrator;
pub mod response;
pub mod routes;
pub mod stages;
pub mod state;
pub mod workers;
