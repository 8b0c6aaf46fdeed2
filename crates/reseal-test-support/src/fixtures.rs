//! Settings and volume builders for scenario tests.

use std::time::Duration;

use reseal_config::RunSettings;
use reseal_core::RunRequest;

/// Region every fake provider reports unless told otherwise.
pub const TEST_REGION: &str = "us-east-1";
/// Instance id used by the standard scenarios.
pub const TEST_INSTANCE: &str = "i-0123456789abcdef0";
/// KMS key used by the standard scenarios.
pub const TEST_KMS_KEY: &str = "arn:aws:kms:us-east-1:111122223333:key/test";

/// Settings that poll every millisecond with an attempt bound, so a stuck
/// wait fails the test instead of hanging it.
#[must_use]
pub fn fast_settings() -> RunSettings {
    RunSettings {
        poll_interval: Duration::from_millis(1),
        max_poll_attempts: Some(50),
        ..RunSettings::default()
    }
}

/// Request targeting [`TEST_INSTANCE`] with [`TEST_KMS_KEY`].
#[must_use]
pub fn test_request() -> RunRequest {
    RunRequest {
        instance_id: TEST_INSTANCE.to_string(),
        kms_key_id: TEST_KMS_KEY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_settings_keep_default_tags() {
        let settings = fast_settings();
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
        assert_eq!(
            settings.provenance_tag_key,
            RunSettings::default().provenance_tag_key
        );
        assert_eq!(test_request().instance_id, TEST_INSTANCE);
    }
}
