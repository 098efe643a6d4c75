use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use shared_models::auth::{JwtClaims, JwtHeader, User};

type HmacSha256 = Hmac<Sha256>;

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let header: JwtHeader = decode_segment(header_b64).map_err(|e| {
        debug!("Failed to decode header: {}", e);
        "Invalid token header".to_string()
    })?;
    if header.alg != "HS256" {
        return Err(format!("Unsupported token algorithm: {}", header.alg));
    }

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        "Invalid signature encoding".to_string()
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims: JwtClaims = decode_segment(claims_b64).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    // Only server-assigned app_metadata carries the clinic role and tenant.
    // Without it the role stays unset and resolves to patient.
    let role = claims.app_metadata_str("role");
    let organization_id = claims.app_metadata_str("organization_id");

    let user = User {
        id: claims.sub,
        email: claims.email,
        role,
        organization_id,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, String> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};
    use serde_json::json;
    use shared_models::auth::UserRole;

    const SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

    #[test]
    fn valid_token_yields_clinic_role_and_tenant() {
        let test_user = TestUser::staff("staff@clinic.co", "org-1");
        let token = JwtTestUtils::create_test_token(&test_user, SECRET, Some(1));

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.id, test_user.id);
        assert_eq!(user.role.as_deref(), Some("staff"));
        assert_eq!(user.organization_id.as_deref(), Some("org-1"));
        assert!(user.created_at.is_some());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = JwtTestUtils::create_expired_token(&TestUser::default(), SECRET);
        assert_eq!(validate_token(&token, SECRET).unwrap_err(), "Token expired");
    }

    #[test]
    fn forged_signature_is_rejected() {
        let token = JwtTestUtils::create_invalid_signature_token(&TestUser::default());
        assert_eq!(
            validate_token(&token, SECRET).unwrap_err(),
            "Invalid token signature"
        );
    }

    #[test]
    fn malformed_token_is_rejected() {
        assert!(validate_token("not-a-jwt", SECRET).is_err());
        assert!(validate_token(&JwtTestUtils::create_malformed_token(), SECRET).is_err());
    }

    #[test]
    fn role_in_user_metadata_is_not_trusted() {
        let token = JwtTestUtils::sign(
            &json!({ "alg": "HS256", "typ": "JWT" }),
            &json!({
                "sub": "9b0c3f52-4d1e-4a7e-8f0a-6f1d2c3b4a59",
                "role": "authenticated",
                "app_metadata": { "provider": "email" },
                "user_metadata": { "role": "superadmin", "organization_id": "org-2" },
                "exp": Utc::now().timestamp() + 3600
            }),
            SECRET,
        );

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.role, None);
        assert_eq!(user.organization_id, None);
        assert_eq!(user.app_role(), UserRole::Patient);
    }

    #[test]
    fn header_without_typ_is_accepted() {
        let token = JwtTestUtils::sign(
            &json!({ "alg": "HS256" }),
            &json!({
                "sub": "9b0c3f52-4d1e-4a7e-8f0a-6f1d2c3b4a59",
                "app_metadata": { "role": "doctor", "organization_id": "org-1" }
            }),
            SECRET,
        );

        let user = validate_token(&token, SECRET).unwrap();
        assert_eq!(user.app_role(), UserRole::Doctor);
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let token = JwtTestUtils::create_test_token(&TestUser::default(), SECRET, None);
        assert_eq!(validate_token(&token, "").unwrap_err(), "JWT secret is not set");
    }
}
