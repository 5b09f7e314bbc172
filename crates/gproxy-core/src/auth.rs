//! 4.I Auth & Admin.

use gproxy_common::{GatewayConfig, Role};

use crate::error::GatewayError;

/// `verify_api_key`: token must be present in `api_list`.
pub fn verify_api_key<'a>(
    config: &'a GatewayConfig,
    bearer: &str,
) -> Result<&'a str, GatewayError> {
    config
        .record_for_token(bearer)
        .map(|rec| rec.api.as_str())
        .ok_or(GatewayError::AuthInvalid)
}

/// `verify_admin_api_key`: token present AND the matching record has
/// `role == admin`.
pub fn verify_admin_api_key<'a>(
    config: &'a GatewayConfig,
    bearer: &str,
) -> Result<&'a str, GatewayError> {
    let record = config
        .record_for_token(bearer)
        .ok_or(GatewayError::AuthInvalid)?;
    if record.role != Role::Admin {
        return Err(GatewayError::PermissionDenied);
    }
    Ok(record.api.as_str())
}

/// Extracts the bearer token from an `Authorization: Bearer <token>` header
/// value, accepting either case for the scheme per common client behavior.
pub fn extract_bearer(header_value: Option<&str>) -> Option<&str> {
    let value = header_value?.trim();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gproxy_common::{ApiKeyRecord, Preferences};

    fn config_with(role: Role) -> GatewayConfig {
        GatewayConfig {
            providers: vec![],
            api_keys: vec![ApiKeyRecord {
                api: "sk-test".into(),
                role,
                model: vec![],
                weights: None,
                preferences: Preferences::default(),
            }],
        }
    }

    #[test]
    fn unknown_token_is_rejected() {
        let config = config_with(Role::User);
        assert!(matches!(
            verify_api_key(&config, "sk-nope"),
            Err(GatewayError::AuthInvalid)
        ));
    }

    #[test]
    fn known_user_token_cannot_use_admin_endpoint() {
        let config = config_with(Role::User);
        assert!(matches!(
            verify_admin_api_key(&config, "sk-test"),
            Err(GatewayError::PermissionDenied)
        ));
    }

    #[test]
    fn admin_token_passes_both_checks() {
        let config = config_with(Role::Admin);
        assert!(verify_api_key(&config, "sk-test").is_ok());
        assert!(verify_admin_api_key(&config, "sk-test").is_ok());
    }

    #[test]
    fn bearer_extraction_is_case_insensitive_on_scheme() {
        assert_eq!(extract_bearer(Some("Bearer sk-a")), Some("sk-a"));
        assert_eq!(extract_bearer(Some("bearer sk-b")), Some("sk-b"));
        assert_eq!(extract_bearer(Some("Basic abc")), None);
        assert_eq!(extract_bearer(None), None);
    }
}
