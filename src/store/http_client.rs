use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::document::DocumentClient;
use crate::{
    common::errors::{StoreError, StoreResult},
    configs::RemoteStoreConfig,
};

const USER_AGENT: &str = concat!("chordpool/", env!("CARGO_PKG_VERSION"));

/// REST document store client.
///
/// * `GET    {url}/ping`
/// * `GET    {url}/{database}/{collection}`
/// * `GET    {url}/{database}/{collection}/{id}`  (404 = absent)
/// * `PUT    {url}/{database}/{collection}/{id}`
/// * `DELETE {url}/{database}/{collection}/{id}`  (404 = already gone)
pub struct HttpDocumentClient {
    http: Client,
    base_url: String,
    database: String,
    token: Option<String>,
}

impl HttpDocumentClient {
    pub fn new(config: &RemoteStoreConfig) -> StoreResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            token: config.token.clone(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database, collection)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn status_error(status: StatusCode, path: String) -> StoreError {
        StoreError::RemoteStatus {
            status: status.as_u16(),
            path,
        }
    }
}

#[async_trait]
impl DocumentClient for HttpDocumentClient {
    async fn ping(&self) -> StoreResult<()> {
        let url = format!("{}/ping", self.base_url);
        let response = self.authorize(self.http.get(&url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response.status(), url))
        }
    }

    async fn find_one(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        let url = self.document_url(collection, id);
        let response = self.authorize(self.http.get(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(Self::status_error(status, url)),
        }
    }

    async fn upsert(&self, collection: &str, id: &str, document: Value) -> StoreResult<()> {
        let url = self.document_url(collection, id);
        let response = self
            .authorize(self.http.put(&url))
            .json(&document)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response.status(), url))
        }
    }

    async fn delete_one(&self, collection: &str, id: &str) -> StoreResult<()> {
        let url = self.document_url(collection, id);
        let response = self.authorize(self.http.delete(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(Self::status_error(status, url)),
        }
    }

    async fn find_all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        let url = self.collection_url(collection);
        let response = self.authorize(self.http.get(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => Ok(response.json().await?),
            status => Err(Self::status_error(status, url)),
        }
    }
}
