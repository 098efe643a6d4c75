use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_models::settings::{SystemConfig, UpdateSystemConfigRequest};

use crate::supabase::SupabaseClient;

const CONFIG_PATH: &str = "/rest/v1/system_config?id=eq.1";

/// Reads and writes the single-row `system_config` table.
pub struct SystemConfigStore {
    supabase: SupabaseClient,
    fallback: SystemConfig,
}

impl SystemConfigStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            fallback: SystemConfig::from_defaults(&config.booking),
        }
    }

    /// Effective configuration; env defaults when the row is missing or unreadable.
    pub async fn load(&self, auth_token: &str) -> SystemConfig {
        match self
            .supabase
            .select_one::<SystemConfig>(CONFIG_PATH, auth_token)
            .await
        {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No system_config row, using environment defaults");
                self.fallback.clone()
            }
            Err(e) => {
                warn!("Failed to load system_config, using environment defaults: {}", e);
                self.fallback.clone()
            }
        }
    }

    pub async fn save(
        &self,
        update: &UpdateSystemConfigRequest,
        auth_token: &str,
    ) -> Result<SystemConfig, AppError> {
        let current = self.load(auth_token).await;
        let merged = current.merged(update)?;

        let row = json!({
            "id": 1,
            "maintenance_mode": merged.maintenance_mode,
            "allow_new_registrations": merged.allow_new_registrations,
            "patient_min_advance_days": merged.patient_min_advance_days,
            "max_advance_booking_days": merged.max_advance_booking_days,
            "default_slot_minutes": merged.default_slot_minutes,
            "updated_at": merged.updated_at.unwrap_or_else(Utc::now).to_rfc3339(),
        });

        let saved: SystemConfig = self
            .supabase
            .upsert("system_config", row, auth_token)
            .await
            .map_err(AppError::from)?;

        debug!("System configuration updated");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_utils::test_utils::TestConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn missing_row_falls_back_to_env_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/system_config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let store = SystemConfigStore::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
        let config = store.load("token").await;
        assert_eq!(config.patient_min_advance_days, 1);
        assert!(!config.maintenance_mode);
    }

    #[tokio::test]
    async fn unreachable_store_falls_back_to_env_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/system_config"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = SystemConfigStore::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
        assert_eq!(store.load("token").await.max_advance_booking_days, 90);
    }

    #[tokio::test]
    async fn save_rejects_invalid_values_before_writing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/system_config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/system_config"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let store = SystemConfigStore::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
        let update = UpdateSystemConfigRequest {
            default_slot_minutes: Some(0),
            ..Default::default()
        };
        assert!(store.save(&update, "token").await.is_err());
    }
}
