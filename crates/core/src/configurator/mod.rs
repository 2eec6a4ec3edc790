pub mod backend;
pub mod dimensions;
pub mod exclusions;
pub mod metadata;
pub mod pricing;
pub mod session;
pub mod submission;
pub mod validation;
pub mod visibility;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{ConfiguratorBackend, OfflineBackend};
pub use session::{ConfigurationSession, OpenRequest, SessionContext, SessionReport};
pub use submission::{ConfirmOutcome, SubmissionPayload};
pub use validation::ValidationFailure;
