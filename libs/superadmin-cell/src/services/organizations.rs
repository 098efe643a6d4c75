use chrono::Utc;
use futures::try_join;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    CreateOrganizationRequest, Organization, OrganizationQuery, OrganizationStats,
    SubscriptionPlan, UpdateOrganizationRequest,
};

const SLUG_PATTERN: &str = r"^[a-z0-9]+(-[a-z0-9]+)*$";
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
const DEFAULT_PAGE_SIZE: u32 = 50;
const MAX_PAGE_SIZE: u32 = 200;

fn matches(pattern: &str, value: &str) -> Result<bool, AppError> {
    Regex::new(pattern)
        .map(|re| re.is_match(value))
        .map_err(|e| AppError::Internal(format!("Invalid pattern: {}", e)))
}

/// Field-level problems with a slug, if any.
pub fn slug_problem(slug: &str) -> Result<Option<&'static str>, AppError> {
    if !(3..=50).contains(&slug.len()) {
        return Ok(Some("must be between 3 and 50 characters"));
    }
    if !matches(SLUG_PATTERN, slug)? {
        return Ok(Some(
            "may only contain lowercase letters, digits and single hyphens",
        ));
    }
    Ok(None)
}

pub fn email_is_valid(email: &str) -> Result<bool, AppError> {
    matches(EMAIL_PATTERN, email.trim())
}

fn into_result(errors: Map<String, Value>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidFields {
            message: "Invalid organization data".to_string(),
            details: Value::Object(errors),
        })
    }
}

pub fn validate_create(request: &CreateOrganizationRequest) -> Result<(), AppError> {
    let mut errors = Map::new();

    if request.name.trim().is_empty() {
        errors.insert("name".to_string(), json!("is required"));
    }
    if let Some(problem) = slug_problem(&request.slug)? {
        errors.insert("slug".to_string(), json!(problem));
    }
    if let Some(email) = request.email.as_deref() {
        if !email_is_valid(email)? {
            errors.insert("email".to_string(), json!("is not a valid email address"));
        }
    }
    if let Some(plan) = request.subscription_plan.as_deref() {
        if let Err(e) = plan.parse::<SubscriptionPlan>() {
            errors.insert("subscription_plan".to_string(), json!(e));
        }
    }

    into_result(errors)
}

pub fn validate_update(request: &UpdateOrganizationRequest) -> Result<(), AppError> {
    let mut errors = Map::new();

    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        errors.insert("name".to_string(), json!("must not be empty"));
    }
    if let Some(slug) = request.slug.as_deref() {
        if let Some(problem) = slug_problem(slug)? {
            errors.insert("slug".to_string(), json!(problem));
        }
    }
    if let Some(email) = request.email.as_deref() {
        if !email_is_valid(email)? {
            errors.insert("email".to_string(), json!("is not a valid email address"));
        }
    }
    if let Some(plan) = request.subscription_plan.as_deref() {
        if let Err(e) = plan.parse::<SubscriptionPlan>() {
            errors.insert("subscription_plan".to_string(), json!(e));
        }
    }

    into_result(errors)
}

pub struct OrganizationService {
    supabase: SupabaseClient,
}

impl OrganizationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list(
        &self,
        query: &OrganizationQuery,
        auth_token: &str,
    ) -> Result<(Vec<Organization>, u64), AppError> {
        let mut filters = Vec::new();
        if let Some(active) = query.is_active {
            filters.push(format!("is_active=eq.{}", active));
        }
        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = urlencoding::encode(term);
            filters.push(format!("or=(name.ilike.*{}*,slug.ilike.*{}*)", term, term));
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);

        let mut count_parts = vec!["select=id".to_string()];
        count_parts.extend(filters.iter().cloned());
        let count_path = format!("/rest/v1/organizations?{}", count_parts.join("&"));

        filters.push("order=created_at.desc".to_string());
        filters.push(format!("limit={}", limit));
        filters.push(format!("offset={}", offset));
        let path = format!("/rest/v1/organizations?{}", filters.join("&"));

        let organizations: Vec<Organization> = self.supabase.select(&path, auth_token).await?;
        let total = self.supabase.count(&count_path, auth_token).await?;

        debug!("Listed {} of {} organizations", organizations.len(), total);
        Ok((organizations, total))
    }

    pub async fn get(&self, organization_id: Uuid, auth_token: &str) -> Result<Organization, AppError> {
        let path = format!("/rest/v1/organizations?id=eq.{}", organization_id);
        self.supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
    }

    async fn ensure_slug_free(
        &self,
        slug: &str,
        except: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let path = format!("/rest/v1/organizations?slug=eq.{}&select=id,name,slug", slug);
        let existing: Vec<Value> = self.supabase.select(&path, auth_token).await?;
        let taken = existing.iter().any(|row| {
            let id = row.get("id").and_then(Value::as_str);
            except.map(|own| Some(own.to_string().as_str()) != id).unwrap_or(true)
        });

        if taken {
            warn!("Organization slug '{}' is already taken", slug);
            return Err(AppError::Conflict(format!(
                "Organization slug '{}' already exists",
                slug
            )));
        }
        Ok(())
    }

    pub async fn create(
        &self,
        request: CreateOrganizationRequest,
        auth_token: &str,
    ) -> Result<Organization, AppError> {
        validate_create(&request)?;
        self.ensure_slug_free(&request.slug, None, auth_token).await?;

        let plan = request
            .subscription_plan
            .as_deref()
            .map(str::parse::<SubscriptionPlan>)
            .transpose()
            .map_err(AppError::ValidationError)?
            .unwrap_or_default();

        let now = Utc::now().to_rfc3339();
        let organization: Organization = self
            .supabase
            .insert(
                "organizations",
                json!({
                    "name": request.name.trim(),
                    "slug": request.slug,
                    "email": request.email.map(|e| e.trim().to_string()),
                    "phone": request.phone,
                    "address": request.address,
                    "timezone": request.timezone.unwrap_or_else(|| "America/Bogota".to_string()),
                    "subscription_plan": plan,
                    "is_active": true,
                    "created_at": now,
                    "updated_at": now,
                }),
                auth_token,
            )
            .await?;

        info!("Organization {} ({}) created", organization.id, organization.slug);
        Ok(organization)
    }

    pub async fn update(
        &self,
        organization_id: Uuid,
        request: UpdateOrganizationRequest,
        auth_token: &str,
    ) -> Result<Organization, AppError> {
        validate_update(&request)?;
        let current = self.get(organization_id, auth_token).await?;

        if let Some(slug) = request.slug.as_deref() {
            if slug != current.slug {
                self.ensure_slug_free(slug, Some(organization_id), auth_token)
                    .await?;
            }
        }

        let plan = request
            .subscription_plan
            .as_deref()
            .map(str::parse::<SubscriptionPlan>)
            .transpose()
            .map_err(AppError::ValidationError)?;

        let mut body = Map::new();
        let fields = [
            ("name", request.name.map(|v| json!(v.trim()))),
            ("slug", request.slug.map(|v| json!(v))),
            ("email", request.email.map(|v| json!(v.trim()))),
            ("phone", request.phone.map(|v| json!(v))),
            ("address", request.address.map(|v| json!(v))),
            ("timezone", request.timezone.map(|v| json!(v))),
            ("subscription_plan", plan.map(|v| json!(v))),
            ("is_active", request.is_active.map(|v| json!(v))),
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

        let path = format!("/rest/v1/organizations?id=eq.{}", organization_id);
        let rows: Vec<Organization> = self
            .supabase
            .update(&path, Value::Object(body), auth_token)
            .await?;

        info!("Organization {} updated", organization_id);
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Organization not found".to_string()))
    }

    pub async fn deactivate(&self, organization_id: Uuid, auth_token: &str) -> Result<Organization, AppError> {
        info!("Deactivating organization {}", organization_id);
        self.update(
            organization_id,
            UpdateOrganizationRequest {
                is_active: Some(false),
                ..Default::default()
            },
            auth_token,
        )
        .await
    }

    pub async fn stats(&self, organization_id: Uuid, auth_token: &str) -> Result<OrganizationStats, AppError> {
        self.get(organization_id, auth_token).await?;

        let scoped = |table: &str, extra: &str| {
            format!(
                "/rest/v1/{}?organization_id=eq.{}&select=id{}",
                table, organization_id, extra
            )
        };
        let users_path = scoped("profiles", "");
        let doctors_path = scoped("doctors", "&is_active=eq.true");
        let appointments_path = scoped("appointments", "");
        let pending_path = scoped("appointments", "&status=eq.pending");

        let (users, doctors, appointments, pending_appointments) = try_join!(
            self.supabase.count(&users_path, auth_token),
            self.supabase.count(&doctors_path, auth_token),
            self.supabase.count(&appointments_path, auth_token),
            self.supabase.count(&pending_path, auth_token),
        )?;

        Ok(OrganizationStats {
            organization_id,
            users,
            doctors,
            appointments,
            pending_appointments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request(slug: &str) -> CreateOrganizationRequest {
        CreateOrganizationRequest {
            name: "Clinica Norte".to_string(),
            slug: slug.to_string(),
            email: Some("contacto@clinicanorte.co".to_string()),
            phone: None,
            address: None,
            timezone: None,
            subscription_plan: Some("premium".to_string()),
        }
    }

    #[test]
    fn slug_format() {
        for ok in ["abc", "clinica-norte", "sede-2-bogota", "a1b"] {
            assert_eq!(slug_problem(ok).unwrap(), None, "{}", ok);
        }
        for bad in ["ab", "Clinica", "clinica--norte", "-clinica", "clinica-", "clínica", "con espacio"] {
            assert!(slug_problem(bad).unwrap().is_some(), "{}", bad);
        }
        assert!(slug_problem(&"a".repeat(51)).unwrap().is_some());
    }

    #[test]
    fn invalid_fields_are_reported_together() {
        let mut req = request("Bad Slug");
        req.email = Some("not-an-email".to_string());
        req.subscription_plan = Some("gold".to_string());

        let err = validate_create(&req).unwrap_err();
        assert_matches!(&err, AppError::InvalidFields { details, .. } => {
            assert!(details.get("slug").is_some());
            assert!(details.get("email").is_some());
            assert!(details.get("subscription_plan").is_some());
        });
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate_create(&request("clinica-norte")).is_ok());
    }

    #[test]
    fn update_allows_partial_bodies() {
        assert!(validate_update(&UpdateOrganizationRequest::default()).is_ok());
        let blank = UpdateOrganizationRequest {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(validate_update(&blank).is_err());
    }
}
