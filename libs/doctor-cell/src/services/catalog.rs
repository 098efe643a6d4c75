use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::error::AppError;

use crate::models::{
    patch_body, CreateLocationRequest, CreateServiceRequest, Location, MedicalService,
    UpdateLocationRequest, UpdateServiceRequest,
};

/// Services and locations offered by an organization.
pub struct CatalogService {
    supabase: SupabaseClient,
}

impl CatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_services(
        &self,
        organization_id: &str,
        include_inactive: bool,
        auth_token: &str,
    ) -> Result<Vec<MedicalService>, AppError> {
        let mut path = format!(
            "/rest/v1/services?organization_id=eq.{}&order=name.asc",
            organization_id
        );
        if !include_inactive {
            path.push_str("&is_active=eq.true");
        }
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    pub async fn get_service(&self, service_id: Uuid, auth_token: &str) -> Result<MedicalService, AppError> {
        let path = format!("/rest/v1/services?id=eq.{}", service_id);
        self.supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or_else(|| AppError::NotFound("Service not found".to_string()))
    }

    pub async fn create_service(
        &self,
        organization_id: &str,
        request: CreateServiceRequest,
        auth_token: &str,
    ) -> Result<MedicalService, AppError> {
        validate_name(&request.name, "Service name")?;
        validate_duration(request.duration_minutes)?;
        validate_price(request.price)?;

        let service: MedicalService = self
            .supabase
            .insert(
                "services",
                json!({
                    "organization_id": organization_id,
                    "name": request.name.trim(),
                    "description": request.description,
                    "duration_minutes": request.duration_minutes,
                    "price": request.price,
                    "category": request.category,
                    "is_active": true,
                }),
                auth_token,
            )
            .await?;

        info!("Service {} created in organization {}", service.id, organization_id);
        Ok(service)
    }

    pub async fn update_service(
        &self,
        service_id: Uuid,
        request: UpdateServiceRequest,
        auth_token: &str,
    ) -> Result<MedicalService, AppError> {
        if let Some(ref name) = request.name {
            validate_name(name, "Service name")?;
        }
        if let Some(duration) = request.duration_minutes {
            validate_duration(duration)?;
        }
        validate_price(request.price)?;

        let body = patch_body(vec![
            ("name", request.name.map(|v| json!(v.trim()))),
            ("description", request.description.map(|v| json!(v))),
            ("duration_minutes", request.duration_minutes.map(|v| json!(v))),
            ("price", request.price.map(|v| json!(v))),
            ("category", request.category.map(|v| json!(v))),
            ("is_active", request.is_active.map(|v| json!(v))),
        ]);
        if body.is_empty() {
            return self.get_service(service_id, auth_token).await;
        }

        let path = format!("/rest/v1/services?id=eq.{}", service_id);
        let rows: Vec<MedicalService> = self
            .supabase
            .update(&path, Value::Object(body), auth_token)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Service not found".to_string()))
    }

    pub async fn deactivate_service(&self, service_id: Uuid, auth_token: &str) -> Result<MedicalService, AppError> {
        info!("Deactivating service {}", service_id);
        self.update_service(
            service_id,
            UpdateServiceRequest {
                is_active: Some(false),
                ..Default::default()
            },
            auth_token,
        )
        .await
    }

    pub async fn list_locations(
        &self,
        organization_id: &str,
        include_inactive: bool,
        auth_token: &str,
    ) -> Result<Vec<Location>, AppError> {
        let mut path = format!(
            "/rest/v1/locations?organization_id=eq.{}&order=name.asc",
            organization_id
        );
        if !include_inactive {
            path.push_str("&is_active=eq.true");
        }
        Ok(self.supabase.select(&path, auth_token).await?)
    }

    pub async fn get_location(&self, location_id: Uuid, auth_token: &str) -> Result<Location, AppError> {
        let path = format!("/rest/v1/locations?id=eq.{}", location_id);
        self.supabase
            .select_one(&path, auth_token)
            .await?
            .ok_or_else(|| AppError::NotFound("Location not found".to_string()))
    }

    pub async fn create_location(
        &self,
        organization_id: &str,
        request: CreateLocationRequest,
        auth_token: &str,
    ) -> Result<Location, AppError> {
        validate_name(&request.name, "Location name")?;
        validate_name(&request.address, "Address")?;

        let location: Location = self
            .supabase
            .insert(
                "locations",
                json!({
                    "organization_id": organization_id,
                    "name": request.name.trim(),
                    "address": request.address.trim(),
                    "city": request.city,
                    "phone": request.phone,
                    "is_active": true,
                }),
                auth_token,
            )
            .await?;

        info!("Location {} created in organization {}", location.id, organization_id);
        Ok(location)
    }

    pub async fn update_location(
        &self,
        location_id: Uuid,
        request: UpdateLocationRequest,
        auth_token: &str,
    ) -> Result<Location, AppError> {
        if let Some(ref name) = request.name {
            validate_name(name, "Location name")?;
        }
        if let Some(ref address) = request.address {
            validate_name(address, "Address")?;
        }

        let body = patch_body(vec![
            ("name", request.name.map(|v| json!(v.trim()))),
            ("address", request.address.map(|v| json!(v.trim()))),
            ("city", request.city.map(|v| json!(v))),
            ("phone", request.phone.map(|v| json!(v))),
            ("is_active", request.is_active.map(|v| json!(v))),
        ]);
        if body.is_empty() {
            return self.get_location(location_id, auth_token).await;
        }

        let path = format!("/rest/v1/locations?id=eq.{}", location_id);
        let rows: Vec<Location> = self
            .supabase
            .update(&path, Value::Object(body), auth_token)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound("Location not found".to_string()))
    }

    pub async fn deactivate_location(&self, location_id: Uuid, auth_token: &str) -> Result<Location, AppError> {
        info!("Deactivating location {}", location_id);
        self.update_location(
            location_id,
            UpdateLocationRequest {
                is_active: Some(false),
                ..Default::default()
            },
            auth_token,
        )
        .await
    }
}

fn validate_name(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(())
}

pub fn validate_duration(minutes: i32) -> Result<(), AppError> {
    if !(5..=480).contains(&minutes) {
        return Err(AppError::ValidationError(
            "Duration must be between 5 and 480 minutes".to_string(),
        ));
    }
    Ok(())
}

fn validate_price(price: Option<f64>) -> Result<(), AppError> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => Err(AppError::ValidationError(
            "Price must be a non-negative amount".to_string(),
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_bounds() {
        assert!(validate_duration(5).is_ok());
        assert!(validate_duration(480).is_ok());
        assert!(validate_duration(4).is_err());
        assert!(validate_duration(481).is_err());
    }

    #[test]
    fn negative_price_is_rejected() {
        assert!(validate_price(None).is_ok());
        assert!(validate_price(Some(0.0)).is_ok());
        assert!(validate_price(Some(-1.0)).is_err());
        assert!(validate_price(Some(f64::NAN)).is_err());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(validate_name("   ", "Location name").is_err());
        assert!(validate_name("Sede Norte", "Location name").is_ok());
    }
}
