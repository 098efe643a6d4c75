use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Map};
use tracing::{info, instrument, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{HealthCheck, HealthComponent, HealthStatus, SystemHealth};

/// Responses slower than this mark a component as degraded.
pub const SLOW_RESPONSE_MS: u64 = 2000;

static STARTED_AT: OnceLock<Instant> = OnceLock::new();

/// Records process start. Later calls keep the first instant.
pub fn mark_started() {
    STARTED_AT.get_or_init(Instant::now);
}

pub fn uptime_seconds() -> u64 {
    STARTED_AT.get_or_init(Instant::now).elapsed().as_secs()
}

pub fn parse_components(names: Option<&[String]>) -> Result<Vec<HealthComponent>, AppError> {
    match names {
        None => Ok(HealthComponent::ALL.to_vec()),
        Some([]) => Ok(HealthComponent::ALL.to_vec()),
        Some(names) => {
            let mut components = Vec::with_capacity(names.len());
            for name in names {
                let component = name
                    .parse::<HealthComponent>()
                    .map_err(AppError::BadRequest)?;
                if !components.contains(&component) {
                    components.push(component);
                }
            }
            Ok(components)
        }
    }
}

pub fn overall_status(checks: &[HealthCheck]) -> HealthStatus {
    if checks.iter().any(|c| c.status == HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if checks.iter().any(|c| c.status == HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

fn status_for_latency(ms: u64) -> HealthStatus {
    if ms > SLOW_RESPONSE_MS {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

pub struct HealthService {
    config: AppConfig,
    supabase: SupabaseClient,
}

impl HealthService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            config: config.clone(),
            supabase: SupabaseClient::new(config),
        }
    }

    #[instrument(skip(self))]
    pub async fn check(&self, components: &[HealthComponent]) -> SystemHealth {
        let checks = join_all(components.iter().map(|c| self.check_component(*c))).await;
        let status = overall_status(&checks);

        if status != HealthStatus::Healthy {
            warn!("System health is {:?}", status);
        } else {
            info!("System health check passed for {} components", checks.len());
        }

        SystemHealth {
            status,
            uptime_seconds: uptime_seconds(),
            components: checks,
            timestamp: Utc::now(),
        }
    }

    async fn check_component(&self, component: HealthComponent) -> HealthCheck {
        match component {
            HealthComponent::Configuration => self.check_configuration(),
            HealthComponent::Database => self.check_remote(component, "/rest/v1/").await,
            HealthComponent::Auth => self.check_remote(component, "/auth/v1/health").await,
        }
    }

    fn check_configuration(&self) -> HealthCheck {
        let mut details = Map::new();
        details.insert("supabase_url_set".to_string(), json!(!self.config.supabase_url.is_empty()));
        details.insert("anon_key_set".to_string(), json!(!self.config.supabase_anon_key.is_empty()));
        details.insert("jwt_secret_set".to_string(), json!(!self.config.supabase_jwt_secret.is_empty()));
        details.insert("clinic_utc_offset_minutes".to_string(), json!(self.config.clinic_utc_offset_minutes));

        let configured = self.config.is_configured();
        HealthCheck {
            component: HealthComponent::Configuration,
            status: if configured {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            response_time_ms: 0,
            last_checked: Utc::now(),
            error_message: (!configured).then(|| "Missing Supabase environment variables".to_string()),
            details,
        }
    }

    #[instrument(skip(self))]
    async fn check_remote(&self, component: HealthComponent, path: &str) -> HealthCheck {
        let started = Instant::now();
        let mut details = Map::new();
        details.insert("endpoint".to_string(), json!(path));

        let (status, response_time_ms, error_message) = match self.supabase.ping(path).await {
            Ok(ms) => (status_for_latency(ms), ms, None),
            Err(e) => {
                warn!("{} check failed: {}", component.as_str(), e);
                (
                    HealthStatus::Unhealthy,
                    started.elapsed().as_millis() as u64,
                    Some(e.to_string()),
                )
            }
        };

        HealthCheck {
            component,
            status,
            response_time_ms,
            last_checked: Utc::now(),
            error_message,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(status: HealthStatus) -> HealthCheck {
        HealthCheck {
            component: HealthComponent::Database,
            status,
            response_time_ms: 10,
            last_checked: Utc::now(),
            error_message: None,
            details: Map::new(),
        }
    }

    #[test]
    fn worst_component_wins() {
        assert_eq!(overall_status(&[]), HealthStatus::Healthy);
        assert_eq!(
            overall_status(&[check(HealthStatus::Healthy), check(HealthStatus::Degraded)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            overall_status(&[check(HealthStatus::Degraded), check(HealthStatus::Unhealthy)]),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn component_selection() {
        assert_eq!(parse_components(None).unwrap().len(), 3);
        let picked = parse_components(Some(&["auth".to_string(), "auth".to_string()])).unwrap();
        assert_eq!(picked, vec![HealthComponent::Auth]);
        assert!(matches!(
            parse_components(Some(&["cache".to_string()])),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn slow_responses_degrade() {
        assert_eq!(status_for_latency(150), HealthStatus::Healthy);
        assert_eq!(status_for_latency(SLOW_RESPONSE_MS + 1), HealthStatus::Degraded);
    }
}
