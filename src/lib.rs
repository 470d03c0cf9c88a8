//! # FTS Control Library
//!
//! Instrument control for a Fourier-Transform Spectrometer whose moving mirror
//! and pointing mirror are mounted on stages of a Newport XPS motion
//! controller. The library holds the instrument logic so the command-line
//! frontend (`main.rs`) and any other caller share it.
//!
//! ## Crate Structure
//!
//! - **`config`**: layered configuration (defaults, TOML file, `FTS_` environment).
//! - **`error`**: the `FtsError` enum used across the crate.
//! - **`hardware`**: capability traits for the controller link and the
//!   configuration transport, the XPS TCP client, a local-directory transport,
//!   and mock implementations for tests and simulation.
//! - **`topology`**: parsing of the controller's system description into motion
//!   groups, stages and travel limits.
//! - **`motion`**: per-group operations and the scan procedure.
//! - **`session`**: one connected controller session.
//! - **`fts`**: operating states, the state machine and its command actor.
//! - **`data`**: persistence of scan artifacts.
//! - **`tracing_setup`**: logging initialization.
//! - **`validation`**: small validation helpers for configuration values.

pub mod config;
pub mod data;
pub mod error;
pub mod fts;
pub mod hardware;
pub mod motion;
pub mod session;
pub mod topology;
pub mod tracing_setup;
pub mod validation;
