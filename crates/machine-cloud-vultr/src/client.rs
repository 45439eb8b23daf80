//! Vultr v2 API client

use crate::error::{Result, VultrError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const VULTR_API_BASE: &str = "https://api.vultr.com/v2";

/// Vultr REST client
#[derive(Clone)]
pub struct VultrClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for VultrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VultrClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VultrInstance {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub main_ip: String,
    #[serde(default)]
    pub v6_main_ip: String,
    #[serde(default)]
    pub internal_ip: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub power_status: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatingSystem {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub family: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub id: String,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Region {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateInstanceRequest {
    pub region: String,
    pub plan: String,
    pub os_id: u64,
    pub label: String,
    pub hostname: String,
    /// Plain text; encoded on the wire
    #[serde(serialize_with = "as_base64")]
    pub user_data: String,
    pub tags: Vec<String>,
    pub enable_ipv6: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attach_vpc: Vec<String>,
}

fn as_base64<S: serde::Serializer>(value: &str, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(value))
}

#[derive(Deserialize)]
struct InstancesResponse {
    instances: Vec<VultrInstance>,
}

#[derive(Deserialize)]
struct InstanceResponse {
    instance: VultrInstance,
}

#[derive(Deserialize)]
struct OsResponse {
    os: Vec<OperatingSystem>,
}

#[derive(Deserialize)]
struct PlansResponse {
    plans: Vec<Plan>,
}

#[derive(Deserialize)]
struct RegionsResponse {
    regions: Vec<Region>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: String,
}

impl VultrClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, VULTR_API_BASE)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn list_instances_by_tag(&self, tag: &str) -> Result<Vec<VultrInstance>> {
        let url = format!("{}/instances", self.base_url);
        tracing::debug!(tag, "Listing vultr instances");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("tag", tag)])
            .send()
            .await?;
        let body: InstancesResponse = decode(response).await?;
        // the tag filter is a prefix match on some API versions
        Ok(body
            .instances
            .into_iter()
            .filter(|i| i.tags.iter().any(|t| t == tag))
            .collect())
    }

    pub async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<VultrInstance> {
        let url = format!("{}/instances", self.base_url);
        tracing::debug!(label = %request.label, "Creating vultr instance");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let body: InstanceResponse = decode(response).await?;
        Ok(body.instance)
    }

    pub async fn delete_instance(&self, id: &str) -> Result<()> {
        let url = format!("{}/instances/{}", self.base_url, id);
        tracing::debug!(id, "Deleting vultr instance");
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn set_instance_tags(&self, id: &str, tags: &[String]) -> Result<()> {
        let url = format!("{}/instances/{}", self.base_url, id);
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "tags": tags }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn list_os(&self) -> Result<Vec<OperatingSystem>> {
        let url = format!("{}/os", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("per_page", "500")])
            .send()
            .await?;
        let body: OsResponse = decode(response).await?;
        Ok(body.os)
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        let url = format!("{}/plans", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("per_page", "500")])
            .send()
            .await?;
        let body: PlansResponse = decode(response).await?;
        Ok(body.plans)
    }

    pub async fn list_regions(&self) -> Result<Vec<Region>> {
        let url = format!("{}/regions", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("per_page", "500")])
            .send()
            .await?;
        let body: RegionsResponse = decode(response).await?;
        Ok(body.regions)
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);
    Err(VultrError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    Ok(check(response).await?.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_data_is_base64_on_the_wire() {
        let request = CreateInstanceRequest {
            user_data: "#!/bin/bash\necho hi\n".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["user_data"], "IyEvYmluL2Jhc2gKZWNobyBoaQo=");
    }
}
