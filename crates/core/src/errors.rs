use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::ids::{LineId, TemplateId, ValueId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("product template {0} is not part of the configuration session")]
    UnknownProduct(TemplateId),
    #[error("attribute line {line_id} does not exist on product template {template_id}")]
    UnknownLine { template_id: TemplateId, line_id: LineId },
    #[error("attribute value {value_id} does not belong to attribute line {line_id}")]
    UnknownValue { line_id: LineId, value_id: ValueId },
    #[error("product template {0} is not available to be added")]
    NotAvailable(TemplateId),
    #[error("product template {0} is not selected")]
    NotSelected(TemplateId),
    #[error("main product {0} cannot be removed from the configuration")]
    MainProductRemoval(TemplateId),
    #[error("a valid crm lead id is required to save the configuration")]
    MissingLead,
    #[error("main product {0} was not found among the selected products")]
    MissingMainProduct(TemplateId),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote call `{route}` failed: {message}")]
    Remote { route: String, message: String },
    #[error("could not decode response from `{route}`: {message}")]
    Decode { route: String, message: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("save rejected by backend: {0}")]
    SaveRejected(String),
}

impl From<ConfigError> for ApplicationError {
    fn from(value: ConfigError) -> Self {
        Self::Configuration(value.to_string())
    }
}

impl From<BackendError> for ApplicationError {
    fn from(value: BackendError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The configuration could not be processed. Check the selection and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The backend is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::SaveRejected(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
