//! Mapping from SDK failures to provider errors.

use std::error::Error;
use std::fmt::Debug;

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use reseal_core::ProviderError;

/// Service error codes for missing resources all end with this suffix
/// (`InvalidVolume.NotFound`, `InvalidSnapshot.NotFound`, ...).
const NOT_FOUND_SUFFIX: &str = ".NotFound";

pub(crate) fn is_not_found_code(code: Option<&str>) -> bool {
    code.is_some_and(|code| code.ends_with(NOT_FOUND_SUFFIX))
}

pub(crate) fn map_sdk_error<E, R>(
    operation: &'static str,
    resource_id: &str,
    err: &SdkError<E, R>,
) -> ProviderError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: Debug,
{
    if is_not_found_code(err.code()) {
        return ProviderError::NotFound {
            resource_id: resource_id.to_string(),
        };
    }
    ProviderError::api(operation, DisplayErrorContext(err).to_string())
}

pub(crate) const fn missing(operation: &'static str, field: &'static str) -> ProviderError {
    ProviderError::UnexpectedResponse { operation, field }
}
