use std::time::Instant;

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::SupabaseError;

pub type SupabaseResult<T> = Result<T, SupabaseError>;

#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> SupabaseResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Without a user token PostgREST runs as `anon` with the project key.
        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> SupabaseResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(SupabaseError::from_response(status, &error_text));
        }

        Ok(response)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> SupabaseResult<T>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None)
            .await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        headers: Option<HeaderMap>,
    ) -> SupabaseResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, auth_token, body, headers).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// GET a PostgREST collection.
    pub async fn select<T>(&self, path: &str, auth_token: &str) -> SupabaseResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.request(Method::GET, path, Some(auth_token), None).await
    }

    pub async fn select_one<T>(&self, path: &str, auth_token: &str) -> SupabaseResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<T> = self.select(path, auth_token).await?;
        Ok(rows.into_iter().next())
    }

    /// POST a row and return the stored representation.
    pub async fn insert<T>(&self, table: &str, body: Value, auth_token: &str) -> SupabaseResult<T>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<T> = self
            .request_with_headers(
                Method::POST,
                &format!("/rest/v1/{}", table),
                Some(auth_token),
                Some(body),
                Some(prefer_headers("return=representation")),
            )
            .await?;

        first_row(rows, table)
    }

    pub async fn upsert<T>(&self, table: &str, body: Value, auth_token: &str) -> SupabaseResult<T>
    where
        T: DeserializeOwned,
    {
        let rows: Vec<T> = self
            .request_with_headers(
                Method::POST,
                &format!("/rest/v1/{}", table),
                Some(auth_token),
                Some(body),
                Some(prefer_headers(
                    "resolution=merge-duplicates,return=representation",
                )),
            )
            .await?;

        first_row(rows, table)
    }

    /// PATCH rows matched by `path` and return them.
    pub async fn update<T>(&self, path: &str, body: Value, auth_token: &str) -> SupabaseResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(
            Method::PATCH,
            path,
            Some(auth_token),
            Some(body),
            Some(prefer_headers("return=representation")),
        )
        .await
    }

    pub async fn delete<T>(&self, path: &str, auth_token: &str) -> SupabaseResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(
            Method::DELETE,
            path,
            Some(auth_token),
            None,
            Some(prefer_headers("return=representation")),
        )
        .await
    }

    /// Exact row count for a filtered collection, read from `Content-Range`.
    pub async fn count(&self, path: &str, auth_token: &str) -> SupabaseResult<u64> {
        let mut headers = prefer_headers("count=exact");
        headers.insert("Range-Unit", HeaderValue::from_static("items"));
        headers.insert("Range", HeaderValue::from_static("0-0"));

        let response = self
            .send(Method::GET, path, Some(auth_token), None, Some(headers))
            .await?;

        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        parse_content_range_total(&range).ok_or_else(|| SupabaseError::Api {
            status: response.status().as_u16(),
            message: format!("Missing row count in Content-Range '{}'", range),
        })
    }

    /// Round-trip time of an unauthenticated call, in milliseconds.
    pub async fn ping(&self, path: &str) -> SupabaseResult<u64> {
        let start = Instant::now();
        self.send(Method::GET, path, None, None, None).await?;
        Ok(start.elapsed().as_millis() as u64)
    }
}

fn header_value(raw: &str) -> SupabaseResult<HeaderValue> {
    HeaderValue::from_str(raw).map_err(|e| SupabaseError::Api {
        status: 0,
        message: format!("Invalid header value: {}", e),
    })
}

fn prefer_headers(prefer: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static(prefer));
    headers
}

fn first_row<T>(rows: Vec<T>, table: &str) -> SupabaseResult<T> {
    rows.into_iter().next().ok_or_else(|| SupabaseError::Api {
        status: 200,
        message: format!("Write to {} returned no rows", table),
    })
}

/// `0-0/42` or `*/0` → total after the slash.
pub fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use shared_utils::test_utils::TestConfig;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range_total("0-0/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-0/*"), None);
        assert_eq!(parse_content_range_total(""), None);
    }

    #[tokio::test]
    async fn select_sends_user_token_and_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/locations"))
            .and(query_param("organization_id", "eq.org-1"))
            .and(header("apikey", "test-anon-key"))
            .and(header("authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "loc-1"}])))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
        let rows: Vec<Value> = client
            .select("/rest/v1/locations?organization_id=eq.org-1", "user-token")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn insert_conflict_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/organizations"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint",
            })))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
        let result: SupabaseResult<Value> = client
            .insert("organizations", json!({"slug": "taken"}), "token")
            .await;
        assert_matches!(result, Err(SupabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn count_reads_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/appointments"))
            .and(header("prefer", "count=exact"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "0-0/17")
                    .set_body_json(json!([{"id": "a"}])),
            )
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config());
        let total = client
            .count("/rest/v1/appointments?select=id", "token")
            .await
            .unwrap();
        assert_eq!(total, 17);
    }
}
