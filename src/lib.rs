pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::memory::{MemoryStore, MemoryTx};
pub use config::{CatalogConfig, EngineConfig};
pub use core::batch::{enroll_batch, EnrollmentReport, EnrollmentRequest};
pub use core::enrollment::EnrollmentService;
pub use core::transaction::{run_in_transaction, EnrollContext};
pub use domain::model::{Enrollment, OfferingId, StudentId};
pub use utils::error::{EnrollmentError, ErrorCategory, ErrorKind, Result, StoreError};
