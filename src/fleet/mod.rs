//! Fleet resources: agent policies, integration policies and enrollment
//! tokens.

pub mod agent_policy;
pub mod enrollment_tokens;
pub mod integration_policy;
