//! Stealth acquisition and change-detection pipeline for sports-results
//! records.
//!
//! Decides what to fetch by comparing local and remote freshness, fetches
//! through a rotating egress pool while evading anti-bot defenses, recovers
//! from blocks and failures with backoff and adaptive throttling, and emits
//! a deduplicated, validated record stream for downstream storage.

pub mod acquire;
pub mod cli;
pub mod config;
pub mod models;
pub mod runner;
pub mod sources;
pub mod state;
