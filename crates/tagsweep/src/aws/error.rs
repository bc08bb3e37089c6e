//! AWS error classification
//!
//! Service errors are classified by their `.code()` through
//! `ProvideErrorMetadata` rather than by string matching on Debug output.
//! Client wrappers convert SDK errors into [`AwsError`] at the call site, so
//! callers holding an `anyhow::Error` can recover the category with
//! [`classify_anyhow_error`].

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// AWS error categories for cleanup logic
#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// Resource was not found (already deleted counts as success)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {message}")]
    Throttled { message: String },

    /// Resource still has dependent objects (e.g. SG with an attached ENI)
    #[error("Resource has dependent objects: {message}")]
    DependencyViolation { message: String },

    /// IAM refused to delete an entity that still has attachments
    #[error("Delete conflict: {message}")]
    DeleteConflict { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error{}: {message}", code_suffix(.code))]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AwsError::Throttled { .. } | AwsError::DependencyViolation { .. }
        )
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    // EC2
    "InvalidInstanceID.NotFound",
    "InvalidAllocationID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidGroupId.NotFound",
    "InvalidSubnetID.NotFound",
    "InvalidRouteTableID.NotFound",
    "InvalidInternetGatewayID.NotFound",
    "InvalidVpcID.NotFound",
    "NatGatewayNotFound",
    "InvalidNatGatewayID.NotFound",
    // ECS
    "ClusterNotFoundException",
    "ServiceNotFoundException",
    "ServiceNotActiveException",
    // IAM
    "NoSuchEntity",
    // CloudWatch Logs
    "ResourceNotFoundException",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// Known AWS error codes for dependency violations (resource still in use)
const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "ClusterContainsServicesException"];

/// Known AWS error codes for IAM delete conflicts
const DELETE_CONFLICT_CODES: &[&str] = &["DeleteConflict"];

/// Classify an AWS error from its code and message.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled { message },
        Some(c) if DEPENDENCY_CODES.contains(&c) => AwsError::DependencyViolation { message },
        Some(c) if DELETE_CONFLICT_CODES.contains(&c) => AwsError::DeleteConflict { message },
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an SDK error from any AWS service client.
pub fn classify_sdk_error<E, R>(error: &SdkError<E, R>) -> AwsError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = error
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(error).to_string());
    classify_aws_error(error.code(), Some(&message))
}

/// Classify an error from an `anyhow::Error`.
///
/// Walks the chain for an [`AwsError`] placed there by a client wrapper (or a
/// test double). Falls back to scanning the rendered chain for a known
/// not-found code.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    for cause in error.chain() {
        if let Some(aws) = cause.downcast_ref::<AwsError>() {
            return aws.clone();
        }
    }

    let rendered = format!("{error:?}");
    let code = NOT_FOUND_CODES
        .iter()
        .chain(THROTTLING_CODES)
        .chain(DEPENDENCY_CODES)
        .chain(DELETE_CONFLICT_CODES)
        .find(|c| rendered.contains(*c));
    match code {
        Some(c) => classify_aws_error(Some(c), Some(&error.to_string())),
        None => AwsError::Sdk {
            code: None,
            message: error.to_string(),
        },
    }
}

/// Turn a not-found error into `Ok(None)`.
pub fn ignore_not_found<T>(result: Result<T, AwsError>) -> Result<Option<T>, AwsError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Map an SDK result into a classified result.
pub trait ClassifySdk<T> {
    fn classify(self) -> Result<T, AwsError>;
}

impl<T, E, R> ClassifySdk<T> for Result<T, SdkError<E, R>>
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    fn classify(self) -> Result<T, AwsError> {
        self.map_err(|e| classify_sdk_error(&e))
    }
}
