mod agent;
mod analysis;
mod behavioral;
pub mod error;
mod event;
mod finding;
mod security;
mod session;
mod util;

pub use agent::{Agent, FrozenPercentiles, PercentileSet};
pub use analysis::{AnalysisKind, AnalysisSession, AnalysisStatus};
pub use behavioral::{
    BehavioralResult, CentroidDistance, ClusterConfidence, ClusterInfo, Confidence, OutlierInfo,
    OutlierSeverity, SessionFeatures, TokenStats, TypicalRange,
};
pub use error::{Error, Result};
pub use event::{span_id_for, trace_id_for, Event, EventName, Level};
pub use finding::{
    AuditEntry, Finding, FindingStatus, Recommendation, RecommendationStatus, Severity,
};
pub use security::{AssessmentCheck, CheckStatus, EvaluationStatus, SecurityReport};
pub use session::{Session, SessionCounters};
pub use util::{short_hash, truncate, PRICING_STALE_AFTER_SECS};
