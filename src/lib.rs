// Library exports for binaries and tests
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod flight;
pub mod identity;
pub mod language;
pub mod marker;
pub mod metadata;
pub mod metrics;
pub mod provider;
pub mod resolver;
pub mod security;
pub mod server;
pub mod store;
pub mod sync;
