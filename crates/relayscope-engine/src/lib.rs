//! Session reconstruction, behavioral clustering, and security assessment.
//!
//! This crate has no I/O of its own: it turns [`relayscope_providers::Message`]
//! slices into session identities ([`resolver`]), session event histories
//! into fingerprints ([`features`]), fingerprints into behavioral clusters
//! ([`behavioral`]), and clusters plus bounds checks into a security report
//! ([`security`]). Callers (relayscope-runtime) own persistence and timing.

pub mod behavioral;
pub mod error;
pub mod features;
pub mod resolver;
pub mod security;

pub use behavioral::{compute_signature, freeze_percentiles, ScoredSession};
pub use error::{Error, Result};
pub use resolver::{SessionMetrics, SessionResolver};
pub use security::assess;
