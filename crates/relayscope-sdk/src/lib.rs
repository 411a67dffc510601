//! Public, stable facade over the relayscope trace pipeline.
//!
//! # Overview
//!
//! `relayscope-sdk` hides the wiring between the provider registry, the
//! trace store, and the background analysis runner behind one [`Client`]
//! handle, so embedders (the CLI, or a third-party dashboard) don't need to
//! construct those pieces themselves.
//!
//! ```no_run
//! use relayscope_sdk::Client;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::connect_default()?;
//! for agent in client.agents().list()? {
//!     println!("{}: {} completed sessions", agent.system_prompt_id, agent.completed_session_count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! This crate is a facade over:
//! - `relayscope-providers`: request/response normalization per upstream API
//! - `relayscope-store`: the embedded trace store
//! - `relayscope-engine`: behavioral clustering and security assessment
//! - `relayscope-runtime`: session monitoring and analysis scheduling

pub mod client;
pub mod error;

pub use client::{
    touch_ide_connection, AgentsClient, AnalysisClient, Client, FindingsClient, SessionsClient,
};
pub use error::{Error, Result};
