//! Data model shared by the startup orchestrator, the session transport and presentation.

pub mod domain;
pub mod error;
pub mod protocol;
