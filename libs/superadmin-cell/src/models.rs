use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn default_active() -> bool {
    true
}

// ==============================================================================
// ORGANIZATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    #[default]
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Basic => "basic",
            SubscriptionPlan::Premium => "premium",
            SubscriptionPlan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(SubscriptionPlan::Basic),
            "premium" => Ok(SubscriptionPlan::Premium),
            "enterprise" => Ok(SubscriptionPlan::Enterprise),
            other => Err(format!(
                "Unknown subscription plan '{}', expected basic, premium or enterprise",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
    #[serde(default)]
    pub subscription_plan: SubscriptionPlan,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub slug: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
    pub subscription_plan: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub timezone: Option<String>,
    pub subscription_plan: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationQuery {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrganizationStats {
    pub organization_id: Uuid,
    pub users: u64,
    pub doctors: u64,
    pub appointments: u64,
    pub pending_appointments: u64,
}

// ==============================================================================
// USERS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub organization_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<String>,
    pub organization_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub organization_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

// ==============================================================================
// SYSTEM HEALTH
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthComponent {
    Configuration,
    Database,
    Auth,
}

impl HealthComponent {
    pub const ALL: [HealthComponent; 3] = [
        HealthComponent::Configuration,
        HealthComponent::Database,
        HealthComponent::Auth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthComponent::Configuration => "configuration",
            HealthComponent::Database => "database",
            HealthComponent::Auth => "auth",
        }
    }
}

impl FromStr for HealthComponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HealthComponent::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown health component '{}'", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub component: HealthComponent,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_checked: DateTime<Utc>,
    pub error_message: Option<String>,
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub components: Vec<HealthCheck>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthCheckRequest {
    pub components: Option<Vec<String>>,
}

/// `?components=database,auth`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthQuery {
    pub components: Option<String>,
}

impl HealthQuery {
    pub fn component_names(&self) -> Option<Vec<String>> {
        self.components.as_deref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parsing() {
        assert_eq!("Premium".parse::<SubscriptionPlan>(), Ok(SubscriptionPlan::Premium));
        assert!("gold".parse::<SubscriptionPlan>().is_err());
        assert_eq!(SubscriptionPlan::default(), SubscriptionPlan::Basic);
    }

    #[test]
    fn component_names() {
        assert_eq!("database".parse::<HealthComponent>(), Ok(HealthComponent::Database));
        assert!("memory".parse::<HealthComponent>().is_err());
    }

    #[test]
    fn organization_defaults_for_missing_columns() {
        let org: Organization = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "name": "Clinica Norte",
            "slug": "clinica-norte",
            "email": null,
            "phone": null,
            "address": null,
            "timezone": null,
            "created_at": null,
            "updated_at": null
        }))
        .unwrap();
        assert_eq!(org.subscription_plan, SubscriptionPlan::Basic);
        assert!(org.is_active);
    }
}
