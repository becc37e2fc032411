use super::{PersistenceBackend, ProspectFilter};
use crate::config::PersistenceMode;
use crate::core::{FieldPatch, Prospect, ProspectId, Result, SyncError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// REST collection client: `{base}/{collection}[/{id}]` with JSON bodies.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    client: Client,
    collection_url: String,
    token: Option<String>,
}

impl RemoteBackend {
    pub fn new(
        base_url: &str,
        collection: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, base_url, collection, token))
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        collection: &str,
        token: Option<String>,
    ) -> Self {
        let collection_url = format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            collection.trim_matches('/')
        );
        Self {
            client,
            collection_url,
            token,
        }
    }

    pub fn collection_url(&self) -> &str {
        &self.collection_url
    }

    fn item_url(&self, id: &ProspectId) -> String {
        format!("{}/{}", self.collection_url, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, id: Option<&ProspectId>) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        check_status(response, id).await
    }
}

async fn check_status(response: Response, id: Option<&ProspectId>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        if let Some(id) = id {
            return Err(SyncError::NotFound(id.to_string()));
        }
    }

    let message = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %message, "remote request rejected");
    Err(SyncError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PersistenceBackend for RemoteBackend {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Remote
    }

    async fn fetch_one(&self, id: &ProspectId) -> Result<Prospect> {
        let response = self.send(self.client.get(self.item_url(id)), Some(id)).await?;
        Ok(response.json().await?)
    }

    async fn fetch_many(&self, filter: &ProspectFilter) -> Result<Vec<Prospect>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(parent) = &filter.parent {
            query.push(("parentId", parent.as_str()));
        }
        if let Some(status) = &filter.status {
            query.push(("status", status.as_str()));
        }

        let request = self.client.get(&self.collection_url).query(&query);
        let response = self.send(request, None).await?;
        Ok(response.json().await?)
    }

    async fn create(&self, payload: &FieldPatch) -> Result<Prospect> {
        let request = self.client.post(&self.collection_url).json(payload);
        let response = self.send(request, None).await?;
        let created: Prospect = response.json().await?;
        debug!(prospect_id = %created.id, "remote prospect created");
        Ok(created)
    }

    async fn update(&self, id: &ProspectId, patch: &FieldPatch) -> Result<Prospect> {
        let request = self.client.patch(self.item_url(id)).json(patch);
        let response = self.send(request, Some(id)).await?;
        let updated: Prospect = response.json().await?;
        debug!(prospect_id = %id, fields = ?patch.field_names(), "remote prospect updated");
        Ok(updated)
    }

    async fn delete(&self, id: &ProspectId) -> Result<()> {
        self.send(self.client.delete(self.item_url(id)), Some(id)).await?;
        debug!(prospect_id = %id, "remote prospect deleted");
        Ok(())
    }
}
