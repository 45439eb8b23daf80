//! Hetzner Cloud (hcloud) API client
//!
//! Only the endpoints the provider needs. Bearer token authentication.

use crate::error::{HetznerError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const HCLOUD_API_BASE: &str = "https://api.hetzner.cloud/v1";

/// hcloud REST client
#[derive(Clone)]
pub struct HcloudClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for HcloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HcloudClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub public_net: PublicNet,
    #[serde(default)]
    pub private_net: Vec<PrivateNet>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicNet {
    pub ipv4: Option<IpAddress>,
    pub ipv6: Option<IpAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpAddress {
    pub ip: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrivateNet {
    pub network: u64,
    pub ip: String,
}

/// A named hcloud resource (server type, image, location, network, ...)
#[derive(Debug, Clone, Deserialize)]
pub struct NamedResource {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    pub user_data: String,
    pub ssh_keys: Vec<u64>,
    pub labels: HashMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<u64>,
    pub public_net: CreatePublicNet,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePublicNet {
    pub enable_ipv4: bool,
    pub enable_ipv6: bool,
}

impl Default for CreatePublicNet {
    fn default() -> Self {
        Self {
            enable_ipv4: true,
            enable_ipv6: true,
        }
    }
}

#[derive(Deserialize)]
struct ServersResponse {
    servers: Vec<Server>,
}

#[derive(Deserialize)]
struct ServerResponse {
    server: Server,
}

#[derive(Deserialize)]
struct SshKeyResponse {
    ssh_key: NamedResource,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    code: String,
    message: String,
}

impl HcloudClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, HCLOUD_API_BASE)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Servers carrying all labels of `label_selector` (`key=value`)
    pub async fn list_servers(&self, label_selector: &str) -> Result<Vec<Server>> {
        let url = format!("{}/servers", self.base_url);
        tracing::debug!(label_selector, "Listing hcloud servers");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("label_selector", label_selector)])
            .send()
            .await?;
        let body: ServersResponse = decode(response).await?;
        Ok(body.servers)
    }

    pub async fn create_server(&self, request: &CreateServerRequest) -> Result<Server> {
        let url = format!("{}/servers", self.base_url);
        tracing::debug!(name = %request.name, "Creating hcloud server");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let body: ServerResponse = decode(response).await?;
        Ok(body.server)
    }

    pub async fn delete_server(&self, id: u64) -> Result<()> {
        let url = format!("{}/servers/{}", self.base_url, id);
        tracing::debug!(id, "Deleting hcloud server");
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn update_server_labels(
        &self,
        id: u64,
        labels: &HashMap<String, String>,
    ) -> Result<Server> {
        let url = format!("{}/servers/{}", self.base_url, id);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "labels": labels }))
            .send()
            .await?;
        let body: ServerResponse = decode(response).await?;
        Ok(body.server)
    }

    /// Looks up a resource collection by exact name
    ///
    /// `collection` is the plural path segment, e.g. `server_types`.
    pub async fn find_by_name(&self, collection: &str, name: &str) -> Result<Option<NamedResource>> {
        let url = format!("{}/{}", self.base_url, collection);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("name", name)])
            .send()
            .await?;
        let body: HashMap<String, serde_json::Value> = decode(response).await?;
        let items = match body.get(collection) {
            Some(items) => serde_json::from_value::<Vec<NamedResource>>(items.clone())?,
            None => Vec::new(),
        };
        Ok(items.into_iter().find(|r| r.name == name))
    }

    pub async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<NamedResource> {
        let url = format!("{}/ssh_keys", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "name": name, "public_key": public_key }))
            .send()
            .await?;
        let body: SshKeyResponse = decode(response).await?;
        Ok(body.ssh_key)
    }

    pub async fn delete_ssh_key(&self, id: u64) -> Result<()> {
        let url = format!("{}/ssh_keys/{}", self.base_url, id);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => (body.error.code, body.error.message),
        Err(_) => (String::new(), text),
    };
    Err(HetznerError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    Ok(check(response).await?.json().await?)
}
