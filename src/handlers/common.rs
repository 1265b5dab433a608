use crate::errors::ServiceError;
use uuid::Uuid;
use validator::Validate;

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}

/// Parses a path id. A malformed id cannot name any record, so it is reported as missing.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ServiceError::NotFound(format!("{} {}", what, raw)))
}
