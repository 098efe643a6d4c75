use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

impl JwtClaims {
    /// Looks a key up in `app_metadata`. `user_metadata` is writable by the
    /// user through `auth.updateUser` and is never consulted.
    pub fn app_metadata_str(&self, key: &str) -> Option<String> {
        self.app_metadata
            .as_ref()
            .and_then(|meta| meta.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Patient,
    Doctor,
    Staff,
    Admin,
    Superadmin,
}

impl UserRole {
    pub const ALL: [UserRole; 5] = [
        UserRole::Patient,
        UserRole::Doctor,
        UserRole::Staff,
        UserRole::Admin,
        UserRole::Superadmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Patient => "patient",
            UserRole::Doctor => "doctor",
            UserRole::Staff => "staff",
            UserRole::Admin => "admin",
            UserRole::Superadmin => "superadmin",
        }
    }

    /// Patients must book ahead; everyone on the clinic side may fill today's gaps.
    pub fn can_book_same_day(&self) -> bool {
        !matches!(self, UserRole::Patient)
    }

    pub fn can_book_for_others(&self) -> bool {
        !matches!(self, UserRole::Patient)
    }

    pub fn can_manage_organization(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::Superadmin)
    }

    pub fn is_superadmin(&self) -> bool {
        matches!(self, UserRole::Superadmin)
    }

    /// Every role except patient and superadmin belongs to a clinic.
    pub fn requires_organization(&self) -> bool {
        matches!(self, UserRole::Doctor | UserRole::Staff | UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(UserRole::Patient),
            "doctor" => Ok(UserRole::Doctor),
            "staff" => Ok(UserRole::Staff),
            "admin" => Ok(UserRole::Admin),
            "superadmin" | "super_admin" => Ok(UserRole::Superadmin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub organization_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Unknown or missing roles get the least privileged role.
    pub fn app_role(&self) -> UserRole {
        self.role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(UserRole::Patient)
    }

    pub fn can_access_organization(&self, organization_id: &str) -> bool {
        if self.app_role().is_superadmin() {
            return true;
        }
        self.organization_id.as_deref() == Some(organization_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub organization_id: Option<String>,
}
