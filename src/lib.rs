//! Anime Tracker Library
//!
//! This library remembers the last watched episode of every anime series
//! seen on supported streaming sites, keeps it within a quota-bound
//! key-value store and probes whether the following episodes are out.

pub mod availability;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod routes;
pub mod sites;
pub mod store;
