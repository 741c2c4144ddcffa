//! Image service and backlog recovery.
//!
//! The service is the intake side of the pipeline:
//! - **Intake**: validate, persist as `created`, store the original, publish
//! - **Lookup**: status or finished file, logical delete
//! - **Recovery**: republish every task still in `created`, at startup and
//!   on an interval

mod config;
mod recovery;
mod service;
mod types;

pub use config::RecoveryConfig;
pub use recovery::spawn_recovery_loop;
pub use service::{format_from_filename, ImageService};
pub use types::{ImageView, RecoverySummary, ServiceError};
