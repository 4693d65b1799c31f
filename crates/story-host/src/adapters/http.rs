use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use story_model::{GroupOutput, RenderRequest, SubsetResponse};
use url::Url;

use super::traits::{FileBrowser, Importer, PathValidator, Persistence, Renderer, SubsetSource};
use crate::config::HttpAdapterConfig;
use crate::protocol::{
    ImportReply, ImportRequest, Listing, PathValidation, Progress, RenderSettingsReply,
    SaveRequest, SavedMeta,
};

/// Backend that talks to the authoring server over HTTP.
pub struct HttpBackend {
    client: Client,
    base: Url,
    config: HttpAdapterConfig,
}

impl HttpBackend {
    pub fn new(config: HttpAdapterConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build http client")?;
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid server url '{}'", config.base_url))?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> anyhow::Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("join '{path}' onto {}", self.base))
    }

    async fn read_body(&self, response: Response) -> anyhow::Result<(bool, Vec<u8>)> {
        let ok = response.status().is_success();
        let status = response.status();
        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_body_size {
                return Err(anyhow!("response of {len} bytes exceeds limit"));
            }
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body (status {status})"))?;
        if bytes.len() > self.config.max_body_size {
            return Err(anyhow!("response of {} bytes exceeds limit", bytes.len()));
        }
        Ok((ok, bytes.to_vec()))
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> anyhow::Result<T> {
        let status = response.status();
        let (ok, body) = self.read_body(response).await?;
        if !ok {
            return Err(anyhow!(
                "server returned {status}: {}",
                String::from_utf8_lossy(&body)
            ));
        }
        serde_json::from_slice(&body).context("decode response")
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> anyhow::Result<T> {
        let response = self
            .client
            .get(url.clone())
            .header("cache-control", "no-cache")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        self.decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        self.decode(response).await
    }
}

#[async_trait]
impl Persistence for HttpBackend {
    async fn save(&self, request: &SaveRequest) -> anyhow::Result<SavedMeta> {
        let url = self.endpoint("/api/save")?;
        self.post(url, request).await
    }

    async fn create_or_update_render_settings(
        &self,
        image_id: &str,
        groups: &[GroupOutput],
    ) -> anyhow::Result<RenderSettingsReply> {
        let mut url = self.endpoint("/api/render_settings")?;
        url.query_pairs_mut().append_pair("image", image_id);
        self.post(url, groups).await
    }
}

#[async_trait]
impl Renderer for HttpBackend {
    async fn render(&self, request: &RenderRequest) -> anyhow::Result<()> {
        let url = self.endpoint("/api/render")?;
        let _: serde_json::Value = self.post(url, request).await?;
        Ok(())
    }

    async fn progress(&self, session: &str) -> anyhow::Result<Progress> {
        let mut url = self.endpoint("/api/render/progress")?;
        url.query_pairs_mut().append_pair("session", session);
        self.get(url).await
    }
}

#[async_trait]
impl SubsetSource for HttpBackend {
    async fn get_subsets(&self, map_key: &str) -> anyhow::Result<SubsetResponse> {
        let mut url = self.endpoint("/api/mask_subsets")?;
        url.query_pairs_mut().append_pair("key", map_key);
        self.get(url).await
    }
}

#[async_trait]
impl PathValidator for HttpBackend {
    async fn validate_path(&self, key: &str) -> anyhow::Result<PathValidation> {
        let mut url = self.endpoint("/api/validate")?;
        url.query_pairs_mut().append_pair("path", key);
        self.get(url).await
    }
}

#[async_trait]
impl FileBrowser for HttpBackend {
    async fn list(&self, path: &str, parent: bool) -> anyhow::Result<Listing> {
        let mut url = self.endpoint("/api/filebrowser")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("path", path);
            if parent {
                query.append_pair("parent", "true");
            }
        }
        self.get(url).await
    }
}

#[async_trait]
impl Importer for HttpBackend {
    /// Import failures come back as a JSON body with an `error` field, which
    /// is handed on rather than turned into an adapter error.
    async fn import(&self, request: &ImportRequest) -> anyhow::Result<ImportReply> {
        let url = self.endpoint("/api/import")?;
        let response = self
            .client
            .post(url.clone())
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let (_, body) = self.read_body(response).await?;
        serde_json::from_slice(&body).context("decode import reply")
    }
}
