pub mod batch;
pub mod enrollment;
pub mod schedule;
pub mod transaction;

pub use crate::domain::model::{Enrollment, OfferingId, StudentId};
pub use crate::domain::ports::{EnrollmentGateway, TransactionManager};
pub use crate::utils::error::Result;
