//! Localpros Directory API Library
//!
//! This library provides the core functionality for the Localpros service
//! provider directory: the recommendation and review aggregation services,
//! the document store they persist through, and the HTTP handlers exposing
//! them.
//!
//! # Modules
//!
//! - `auth`: Identity provider client (session verification).
//! - `circuit_breaker`: Circuit breaker for identity-provider calls.
//! - `config`: Configuration management.
//! - `db`: Database connection and schema management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and routing.
//! - `models`: Core data models.
//! - `services`: Recommendation and review aggregation services.
//! - `session_cache`: Checksum-validated session cache entries.
//! - `store`: Document store contract and implementations.

// Re-export primary modules for shared use in tests and other binaries
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod session_cache;
pub mod store;
