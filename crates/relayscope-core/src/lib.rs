pub mod ids;
pub mod path;

pub use ids::{new_analysis_session_id, new_finding_id, new_recommendation_id, new_session_id};
pub use path::{default_db_path, expand_tilde, resolve_workspace_path, Error, Result};
