use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::config::Config;
use chat_core::{BranchSnapshot, MessageId, ResumeResponse, VersionId, VersionSnapshot};
use reqwest::{Client, Proxy};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use url::Url;

use crate::api::models::{
    BranchTarget, EditRequest, EditResponse, RetryRequest, RetryResponse, SwitchBranchRequest,
    SwitchResponse, SwitchVersionRequest,
};
use crate::client_trait::{BranchBackend, StreamBackend};
use crate::error::{BackendError, Result};
use crate::utils::http_utils::{apply_proxy_auth, check_status, decode_json};

/// Store client over HTTP.
///
/// Branch/version queries are idempotent reads and go through the retry
/// middleware. Resume calls and every mutation use a client without retries:
/// a failed resume surfaces as a transport error and is only repeated on an
/// explicit retry by the user.
#[derive(Debug, Clone)]
pub struct HttpChatClient {
    base_url: Url,
    api_key: Option<String>,
    client: Arc<ClientWithMiddleware>,
    query_client: Arc<ClientWithMiddleware>,
}

impl HttpChatClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.api_base)?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::InvalidBase(config.api_base.clone()));
        }

        let http = Self::build_http_client(config)?;
        let client = ClientBuilder::new(http.clone()).build();
        let query_client = Self::build_retry_client(http, config.fetch_retries);

        tracing::debug!(
            api_base = %base_url,
            fetch_retries = config.fetch_retries,
            "Created HTTP chat client"
        );

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            client: Arc::new(client),
            query_client: Arc::new(query_client),
        })
    }

    fn build_http_client(config: &Config) -> Result<Client> {
        let mut builder = Client::builder();
        if !config.http_proxy.is_empty() {
            let mut proxy = Proxy::http(&config.http_proxy)?;
            proxy = apply_proxy_auth(proxy, config.http_proxy_auth.as_ref());
            builder = builder.proxy(proxy);
        }
        if !config.https_proxy.is_empty() {
            let mut proxy = Proxy::https(&config.https_proxy)?;
            proxy = apply_proxy_auth(proxy, config.https_proxy_auth.as_ref());
            builder = builder.proxy(proxy);
        }
        Ok(builder.build()?)
    }

    fn build_retry_client(client: Client, max_retries: u32) -> ClientWithMiddleware {
        // Exponential backoff from 100ms, capped at 5s, with jitter
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
            .base(2)
            .build_with_max_retries(max_retries);

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }

    /// `{base}/messages/{message_id}/{segments...}`
    fn endpoint(&self, message_id: &MessageId, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidBase(self.base_url.to_string()))?
            .pop_if_empty()
            .push("messages")
            .push(message_id.as_str())
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }
}

#[async_trait]
impl StreamBackend for HttpChatClient {
    async fn resume_stream(
        &self,
        message_id: &MessageId,
        from_position: u64,
    ) -> Result<ResumeResponse> {
        let mut url = self.endpoint(message_id, &["stream"])?;
        url.query_pairs_mut()
            .append_pair("fromPosition", &from_position.to_string());

        tracing::debug!(message_id = %message_id, from_position, "resume_stream");
        let response = self.authorize(self.client.get(url)).send().await?;
        decode_json(response).await
    }

    async fn mark_stream_complete(&self, message_id: &MessageId) -> Result<()> {
        let url = self.endpoint(message_id, &["stream", "complete"])?;
        tracing::debug!(message_id = %message_id, "mark_stream_complete");
        let response = self.authorize(self.client.post(url)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl BranchBackend for HttpChatClient {
    async fn get_message_branches(&self, message_id: &MessageId) -> Result<BranchSnapshot> {
        let url = self.endpoint(message_id, &["branches"])?;
        let response = self.authorize(self.query_client.get(url)).send().await?;
        decode_json(response).await
    }

    async fn get_message_versions(&self, message_id: &MessageId) -> Result<VersionSnapshot> {
        let url = self.endpoint(message_id, &["versions"])?;
        let response = self.authorize(self.query_client.get(url)).send().await?;
        decode_json(response).await
    }

    async fn switch_branch(
        &self,
        message_id: &MessageId,
        target: &BranchTarget,
    ) -> Result<SwitchResponse> {
        let url = self.endpoint(message_id, &["branches", "active"])?;
        let body = SwitchBranchRequest::from(target);
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> Result<SwitchResponse> {
        let url = self.endpoint(message_id, &["versions", "active"])?;
        let body = SwitchVersionRequest {
            version_id: version_id.clone(),
        };
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn edit_message(
        &self,
        message_id: &MessageId,
        new_content: &str,
    ) -> Result<EditResponse> {
        let url = self.endpoint(message_id, &["edit"])?;
        let body = EditRequest {
            content: new_content.to_string(),
        };
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        decode_json(response).await
    }

    async fn retry_message(&self, message_id: &MessageId, model: &str) -> Result<RetryResponse> {
        let url = self.endpoint(message_id, &["retry"])?;
        let body = RetryRequest {
            model: model.to_string(),
        };
        let response = self
            .authorize(self.client.post(url))
            .json(&body)
            .send()
            .await?;
        decode_json(response).await
    }
}
