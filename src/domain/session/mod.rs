// Execution history
pub mod session_log;

pub use session_log::{EnvironmentInfo, ErrorDetail, ErrorOrigin, Outcome, SessionLog, SessionParameters};
