// src/relayer.rs
use async_trait::async_trait;
use ethers::types::H256;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Result, UserOpError};
use crate::types::{AccountSaltResponse, SigningRequest, StatusResponse, SubmitResponse};

/// Email relayer that runs the signing ceremony.
#[async_trait]
pub trait Relayer: Send + Sync {
    /// Queues a signing request and returns the relayer's request id.
    async fn submit(&self, request: &SigningRequest) -> Result<String>;

    async fn status(&self, request_id: &str) -> Result<StatusResponse>;

    async fn account_salt(&self, account_code: &str, email_address: &str) -> Result<H256>;
}

pub struct HttpRelayer {
    client: Client,
    base_url: Url,
}

impl HttpRelayer {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                UserOpError::Configuration(format!("relayer url {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self.client.post(self.endpoint(&[path])?).json(body).send().await?;
        Ok(response)
    }
}

#[async_trait]
impl Relayer for HttpRelayer {
    async fn submit(&self, request: &SigningRequest) -> Result<String> {
        let response = self.post("submit", request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UserOpError::RemoteRejection(format!(
                "relayer /submit returned {status}: {body}"
            )));
        }

        let submitted: SubmitResponse = response.json().await?;
        debug!(id = %submitted.id, status = ?submitted.status, "Relayer accepted request");
        Ok(submitted.id)
    }

    async fn status(&self, request_id: &str) -> Result<StatusResponse> {
        let response = self
            .client
            .get(self.endpoint(&["status", request_id])?)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            other => Err(UserOpError::Transport(format!(
                "relayer /status/{request_id} returned {other}"
            ))),
        }
    }

    async fn account_salt(&self, account_code: &str, email_address: &str) -> Result<H256> {
        let body = json!({
            "accountCode": account_code,
            "emailAddress": email_address,
        });
        let response = self.post("accountSalt", &body).await?;
        if !response.status().is_success() {
            return Err(UserOpError::RemoteRejection(format!(
                "relayer /accountSalt returned {}",
                response.status()
            )));
        }
        let salt: AccountSaltResponse = response.json().await?;
        Ok(salt.account_salt)
    }
}
