//! replica-sync - Keep DNS filtering appliances in line with a primary
//!
//! This crate replicates the configuration bundle and the structured
//! configuration document of one primary appliance to an ordered list of
//! replicas, optionally filtering the document per section, and can repeat
//! the run on a cron schedule.

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod models;
pub mod service;
pub mod sync;
pub mod webhook;
