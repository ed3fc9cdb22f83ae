//! Provider-style error taxonomy.
//!
//! Every failure carries the provider error code string (`code()`) and a
//! human readable message (`Display`). `kind()` groups codes into the broad
//! classes callers branch on.

use serde::Serialize;
use thiserror::Error;

/// Errors returned by action handlers.
#[derive(Debug, Clone, Error)]
pub enum Ec2Error {
    /// A referenced id does not exist.
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// A required parameter is absent.
    #[error("The request must contain the parameter {0}")]
    MissingParameter(String),

    /// Malformed or contradictory parameters.
    #[error("{message}")]
    InvalidParameter { code: &'static str, message: String },

    /// The mutation would break a structural invariant.
    #[error("{0}")]
    DependencyViolation(String),

    /// Exact duplicate of an existing resource or rule.
    #[error("{message}")]
    Duplicate { code: &'static str, message: String },

    /// Request collides with existing state (overlapping ranges, limits).
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// Unknown action name.
    #[error("The action {0} is not valid for this web service.")]
    InvalidAction(String),

    /// Response shaping failed.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Broad error class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    DependencyViolation,
    Duplicate,
    Conflict,
    Internal,
}

impl Ec2Error {
    /// `<Kind>` id not found, e.g. `not_found("InvalidVpcID.NotFound", "vpc", id)`.
    pub fn not_found(code: &'static str, label: &str, id: &str) -> Self {
        Ec2Error::NotFound {
            code,
            message: format!("The {} ID '{}' does not exist", label, id),
        }
    }

    pub fn vpc_not_found(id: &str) -> Self {
        Self::not_found("InvalidVpcID.NotFound", "vpc", id)
    }

    pub fn subnet_not_found(id: &str) -> Self {
        Self::not_found("InvalidSubnetID.NotFound", "subnet", id)
    }

    pub fn route_table_not_found(id: &str) -> Self {
        Self::not_found("InvalidRouteTableID.NotFound", "routeTable", id)
    }

    pub fn network_acl_not_found(id: &str) -> Self {
        Self::not_found("InvalidNetworkAclID.NotFound", "network acl", id)
    }

    pub fn group_not_found(id: &str) -> Self {
        Ec2Error::NotFound {
            code: "InvalidGroup.NotFound",
            message: format!("The security group '{}' does not exist", id),
        }
    }

    /// `InvalidParameterValue` with the given message.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Ec2Error::InvalidParameter {
            code: "InvalidParameterValue",
            message: message.into(),
        }
    }

    /// `InvalidParameterCombination` with the given message.
    pub fn invalid_combination(message: impl Into<String>) -> Self {
        Ec2Error::InvalidParameter {
            code: "InvalidParameterCombination",
            message: message.into(),
        }
    }

    /// Validation failure with a specific code.
    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        Ec2Error::InvalidParameter {
            code,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Ec2Error::DependencyViolation(message.into())
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Ec2Error::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn duplicate(code: &'static str, message: impl Into<String>) -> Self {
        Ec2Error::Duplicate {
            code,
            message: message.into(),
        }
    }

    /// Provider error code string.
    pub fn code(&self) -> &str {
        match self {
            Ec2Error::NotFound { code, .. }
            | Ec2Error::InvalidParameter { code, .. }
            | Ec2Error::Duplicate { code, .. }
            | Ec2Error::Conflict { code, .. } => code,
            Ec2Error::MissingParameter(_) => "MissingParameter",
            Ec2Error::DependencyViolation(_) => "DependencyViolation",
            Ec2Error::InvalidAction(_) => "InvalidAction",
            Ec2Error::Internal(_) => "InternalError",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Ec2Error::NotFound { .. } => ErrorKind::NotFound,
            Ec2Error::MissingParameter(_)
            | Ec2Error::InvalidParameter { .. }
            | Ec2Error::InvalidAction(_) => ErrorKind::Validation,
            Ec2Error::DependencyViolation(_) => ErrorKind::DependencyViolation,
            Ec2Error::Duplicate { .. } => ErrorKind::Duplicate,
            Ec2Error::Conflict { .. } => ErrorKind::Conflict,
            Ec2Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Render the provider error envelope.
    pub fn to_response(&self, request_id: &str) -> ErrorResponse {
        ErrorResponse {
            errors: ErrorList {
                error: ErrorBody {
                    code: self.code().to_string(),
                    message: self.to_string(),
                },
            },
            request_id: request_id.to_string(),
        }
    }
}

impl From<serde_json::Error> for Ec2Error {
    fn from(e: serde_json::Error) -> Self {
        Ec2Error::Internal(e.to_string())
    }
}

/// Error envelope: `{"Errors": {"Error": {"Code", "Message"}}, "RequestID"}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "Errors")]
    pub errors: ErrorList,
    #[serde(rename = "RequestID")]
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorList {
    #[serde(rename = "Error")]
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Result type for handler operations.
pub type Result<T> = std::result::Result<T, Ec2Error>;
