pub mod config;
pub mod configurator;
pub mod domain;
pub mod errors;

pub use configurator::{
    ConfigurationSession, ConfiguratorBackend, ConfirmOutcome, OfflineBackend, OpenRequest,
    SessionContext, SessionReport, SubmissionPayload, ValidationFailure,
};
pub use domain::attribute::{AttributeLine, AttributeRole, AttributeValue, DisplayKind};
pub use domain::ids::{LineId, TemplateId, ValueId, VariantId};
pub use domain::product::{Combination, ProductNode};
pub use errors::{ApplicationError, BackendError, DomainError, InterfaceError};
