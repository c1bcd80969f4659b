//! # Heliocam Library
//!
//! Internal library for the heliocam binary.
//!
//! This library exists to enable testing of the scheduling and mode
//! arbitration internals and to keep CLI dispatch (main.rs) separate from
//! application logic.
//!
//! ## Architecture
//!
//! - **Core Logic**: `scheduler` owns the capture loop; `controller`
//!   arbitrates camera mode under the mode lock; `sun` computes the
//!   daily capture window.
//! - **Hardware**: `camera` defines the backend trait with a Raspberry Pi
//!   implementation and a mock for tests.
//! - **Surfaces**: `web` (axum control routes and MJPEG stream) and
//!   `mqtt` (Home Assistant state, discovery, and commands).
//! - **Infrastructure**: configuration, persisted enable state, signal
//!   handling, time abstraction, logging, and the error taxonomy.

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod camera;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod mqtt;
pub mod persist;
pub mod scheduler;
pub mod signals;
pub mod sun;
pub mod time_source;
pub mod web;
