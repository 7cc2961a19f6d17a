//! Headless driver for browser-hosted QUnit suites.
//!
//! Opens a test document in a page engine, folds the adapter's wire messages
//! into a [`models::SuiteReport`], guards the run with an inactivity watchdog
//! and settles on one [`models::RunOutcome`].

pub mod aggregator;
pub mod batch;
pub mod config;
pub mod engine;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod reporter;
pub mod supervisor;
