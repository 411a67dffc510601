//! Testing infrastructure for relayscope integration tests.
//!
//! This crate provides utilities for writing robust integration tests:
//! - `TestWorld`: fluent interface for declarative workspace setup
//! - `assertions`: custom assertions over agent/session/finding state
//! - `fixtures`: sample provider request/response bodies and session builders
//! - `process`: background process management for the `serve` subcommand

pub mod assertions;
pub mod fixtures;
pub mod process;
pub mod world;

pub use world::TestWorld;
