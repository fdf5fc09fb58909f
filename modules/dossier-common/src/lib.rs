pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use config::{Config, LlmProvider, SearchEngine};
pub use error::DossierError;
pub use state::{InvestigationContext, InvestigationState, LogEntry};
pub use types::*;
