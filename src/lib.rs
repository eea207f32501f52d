//! Air-quality ETL pipeline: ingest → load → clean → aggregate → analyze.
//!
//! Fetches current weather and air-quality readings for a configured set of
//! cities, archives the raw snapshots in PostgreSQL, validates them, rolls
//! them up into daily per-city averages, and joins the yearly city averages
//! with a static province-level ISPA prevalence reference. Every stage is
//! idempotent over already-processed rows, so interrupted or repeated runs
//! converge to the same state.
//!
//! The binary in `main.rs` wires configuration, tracing, and the connection
//! pool, then dispatches into [`stages`].

pub mod config;
pub mod models;
pub mod schema;
pub mod seed;
pub mod stages;

pub use config::Config;
