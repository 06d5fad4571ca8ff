//! # Pricewatch Library
//!
//! Core of the pricing-intelligence pipeline: fetch, dedup, score,
//! select, synthesise, and assemble the run report.

pub mod analytics;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod models;
pub mod patterns;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod select;
pub mod summarize;
pub mod telemetry;
pub mod vendors;
