//! Background workers glueing [`relayscope_store`] and [`relayscope_engine`]
//! together: the session monitor that freezes behavioral signatures as
//! sessions go idle, the analysis runner that schedules clustering and
//! security assessment once an agent has enough completed sessions, and the
//! pricing cache that keeps token-cost estimates current.
//!
//! None of this crate talks HTTP; it is wired into a running server by
//! `relayscope-sdk`/`relayscope-cli`.

pub mod analysis_runner;
pub mod config;
pub mod error;
pub mod monitor;
pub mod pricing;

pub use analysis_runner::{AnalysisRunner, MIN_SESSIONS_FOR_RISK_ANALYSIS};
pub use config::{Config, UpstreamConfig};
pub use error::{Error, Result};
pub use monitor::SessionMonitor;
pub use pricing::{ModelPricing, PricingCache};
