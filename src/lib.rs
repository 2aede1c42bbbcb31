//! Live AIS vessel positions.
//!
//! Ingests an upstream AIS WebSocket feed into a latest-position store and
//! serves bounding-box filtered GeoJSON snapshots to WebSocket subscribers.

pub mod config;
pub mod context;
pub mod database;
pub mod errors;
pub mod feed;
pub mod geo;
pub mod ingest;
pub mod models;
pub mod server;
pub mod session;
