use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

use crate::models::{UpdateUserRequest, UserAccount, UserQuery};

const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

/// Rejects changes a superadmin may not make to their own account.
pub fn check_self_change(
    actor: &User,
    target_id: Uuid,
    new_role: Option<UserRole>,
    is_active: Option<bool>,
) -> Result<(), AppError> {
    if actor.id != target_id.to_string() {
        return Ok(());
    }
    if new_role.is_some_and(|role| !role.is_superadmin()) {
        return Err(AppError::BadRequest(
            "Superadmins cannot remove their own superadmin role".to_string(),
        ));
    }
    if is_active == Some(false) {
        return Err(AppError::BadRequest(
            "Superadmins cannot deactivate their own account".to_string(),
        ));
    }
    Ok(())
}

fn parse_role(raw: &str) -> Result<UserRole, AppError> {
    raw.parse::<UserRole>().map_err(|e| AppError::InvalidFields {
        message: "Invalid user data".to_string(),
        details: json!({ "role": e }),
    })
}

pub struct UserService {
    supabase: SupabaseClient,
}

impl UserService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list(
        &self,
        query: &UserQuery,
        auth_token: &str,
    ) -> Result<(Vec<UserAccount>, u64), AppError> {
        let mut filters = Vec::new();
        if let Some(role) = query.role.as_deref() {
            filters.push(format!("role=eq.{}", parse_role(role)?));
        }
        if let Some(organization_id) = query.organization_id {
            filters.push(format!("organization_id=eq.{}", organization_id));
        }
        if let Some(active) = query.is_active {
            filters.push(format!("is_active=eq.{}", active));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = urlencoding::encode(term);
            filters.push(format!(
                "or=(email.ilike.*{t}*,first_name.ilike.*{t}*,last_name.ilike.*{t}*)",
                t = term
            ));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        let mut count_parts = vec!["select=id".to_string()];
        count_parts.extend(filters.iter().cloned());
        let count_path = format!("/rest/v1/profiles?{}", count_parts.join("&"));

        filters.push("order=created_at.desc".to_string());
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", offset));
        let path = format!("/rest/v1/profiles?{}", filters.join("&"));

        let users: Vec<UserAccount> = self.supabase.select(&path, auth_token).await?;
        let total = self.supabase.count(&count_path, auth_token).await?;

        debug!("Listed {} of {} users", users.len(), total);
        Ok((users, total))
    }

    pub async fn get(&self, user_id: Uuid, auth_token: &str) -> Result<UserAccount, AppError> {
        let path = format!("/rest/v1/profiles?id=eq.{}", user_id);
        self.supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn ensure_organization_exists(
        &self,
        organization_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let path = format!("/rest/v1/organizations?id=eq.{}&select=id", organization_id);
        let found: Option<Value> = self.supabase.select_one(&path, auth_token).await?;
        if found.is_none() {
            return Err(AppError::ValidationError(format!(
                "Organization {} does not exist",
                organization_id
            )));
        }
        Ok(())
    }

    pub async fn update(
        &self,
        actor: &User,
        user_id: Uuid,
        request: UpdateUserRequest,
        auth_token: &str,
    ) -> Result<UserAccount, AppError> {
        let new_role = request.role.as_deref().map(parse_role).transpose()?;
        check_self_change(actor, user_id, new_role, request.is_active)?;

        let current = self.get(user_id, auth_token).await?;
        let role = match new_role {
            Some(role) => role,
            None => current.role.parse::<UserRole>().unwrap_or(UserRole::Patient),
        };
        let organization_id = request.organization_id.or(current.organization_id);

        if role.requires_organization() && organization_id.is_none() {
            warn!("Role {} assigned to user {} without an organization", role, user_id);
            return Err(AppError::ValidationError(format!(
                "Role '{}' requires an organization",
                role
            )));
        }
        if let Some(organization_id) = request.organization_id {
            self.ensure_organization_exists(organization_id, auth_token)
                .await?;
        }

        let mut body = Map::new();
        let fields = [
            ("role", new_role.map(|v| json!(v))),
            ("organization_id", request.organization_id.map(|v| json!(v))),
            ("is_active", request.is_active.map(|v| json!(v))),
            ("first_name", request.first_name.map(|v| json!(v.trim()))),
            ("last_name", request.last_name.map(|v| json!(v.trim()))),
            ("phone", request.phone.map(|v| json!(v))),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                body.insert(key.to_string(), value);
            }
        }
        if body.is_empty() {
            return Ok(current);
        }
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/profiles?id=eq.{}", user_id);
        let rows: Vec<UserAccount> = self
            .supabase
            .update(&path, Value::Object(body), auth_token)
            .await?;

        info!("User {} updated by {}", user_id, actor.id);
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn deactivate(
        &self,
        actor: &User,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<UserAccount, AppError> {
        self.update(
            actor,
            user_id,
            UpdateUserRequest {
                is_active: Some(false),
                ..Default::default()
            },
            auth_token,
        )
        .await
    }
}
