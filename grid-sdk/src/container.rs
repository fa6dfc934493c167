//! Container half of the placement client: container CRUD and the
//! prepare/create/show/delete content cycle.

use std::sync::Arc;

use crate::config::{proxy_container_url, Config};
use crate::error::SdkError;
use crate::name::{ContainerName, ObjectName, QualifiedContent};
use crate::proxy::{escape, ProxyCore, HEADER_ACTION_MODE};
use crate::types::{Chunk, ContainerListing, Content};

const HEADER_CONTENT_META_ID: &str = "X-oio-content-meta-id";
const HEADER_CONTENT_META_NAME: &str = "X-oio-content-meta-name";
const HEADER_CONTENT_META_POLICY: &str = "X-oio-content-meta-policy";
const HEADER_CONTENT_META_VERSION: &str = "X-oio-content-meta-version";
const HEADER_CONTENT_META_LENGTH: &str = "X-oio-content-meta-length";

pub struct ContainerClient {
    core: ProxyCore,
}

impl ContainerClient {
    /// A client bound to one namespace; calls for any other namespace are
    /// refused.
    pub fn new(ns: &str, config: Arc<dyn Config>) -> Result<ContainerClient, SdkError> {
        Ok(ContainerClient {
            core: ProxyCore::new(ns, config)?,
        })
    }

    fn container_url(&self, n: &dyn ContainerName, action: &str) -> Result<String, SdkError> {
        let proxy = proxy_container_url(self.core.config.as_ref(), &self.core.ns)?;
        Ok(format!(
            "http://{}/v3.0/{}/container/{}?acct={}&ref={}",
            proxy,
            self.core.ns,
            action,
            escape(n.account()),
            escape(n.user()),
        ))
    }

    fn content_url(&self, n: &dyn ObjectName, action: &str) -> Result<String, SdkError> {
        let proxy = proxy_container_url(self.core.config.as_ref(), &self.core.ns)?;
        Ok(format!(
            "http://{}/v3.0/{}/content/{}?acct={}&ref={}&path={}",
            proxy,
            self.core.ns,
            action,
            escape(n.account()),
            escape(n.user()),
            escape(n.path()),
        ))
    }

    fn mutating(&self, req: reqwest::RequestBuilder, autocreate: bool) -> reqwest::RequestBuilder {
        match self.core.action_mode(autocreate, false) {
            Some(mode) => req.header(HEADER_ACTION_MODE, mode),
            None => req,
        }
    }

    pub async fn create(&self, n: &dyn ContainerName, autocreate: bool) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.container_url(n, "create")?;
        let req = self.mutating(self.core.http.post(url).body("{}"), autocreate);
        self.core.simple(req).await
    }

    pub async fn destroy(&self, n: &dyn ContainerName) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.container_url(n, "destroy")?;
        self.core.simple(self.core.http.post(url)).await
    }

    /// `(false, Ok)` when the container simply does not exist.
    pub async fn has(&self, n: &dyn ContainerName) -> Result<bool, SdkError> {
        self.core.check_ns(n)?;
        let url = self.container_url(n, "show")?;
        match self.core.simple(self.core.http.get(url)).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, n: &dyn ContainerName) -> Result<ContainerListing, SdkError> {
        self.core.check_ns(n)?;
        let url = self.container_url(n, "list")?;
        self.core.json(self.core.http.get(url)).await
    }

    /// Chunk locations and metadata of a stored object.
    pub async fn show_content(&self, n: &dyn ObjectName) -> Result<Content, SdkError> {
        self.core.check_ns(n)?;
        let url = self.content_url(n, "show")?;
        let chunks: Vec<Chunk> = self.core.json(self.core.http.get(url)).await?;
        Ok(Content {
            chunks,
            ..Content::default()
        })
    }

    /// Ask the proxy for placements to upload `size` bytes: the chunk set
    /// comes in the body, the assigned content identity in the headers.
    pub async fn prepare_content(
        &self,
        n: &dyn ObjectName,
        size: u64,
        autocreate: bool,
    ) -> Result<Content, SdkError> {
        self.core.check_ns(n)?;
        let url = self.content_url(n, "prepare")?;
        let body = serde_json::json!({ "policy": "", "size": size.to_string() });
        let req = self.mutating(self.core.http.post(url).json(&body), autocreate);

        let (chunks, headers) = self.core.json_with_headers::<Vec<Chunk>>(req).await?;

        let mut content = Content {
            chunks,
            ..Content::default()
        };
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        content.header.id = header_str(HEADER_CONTENT_META_ID);
        content.header.name = header_str(HEADER_CONTENT_META_NAME);
        content.header.policy = header_str(HEADER_CONTENT_META_POLICY);
        content.header.version = header_str(HEADER_CONTENT_META_VERSION).parse().unwrap_or(0);
        content.header.size = size;
        Ok(content)
    }

    /// Commit the chunk set after the bytes landed; always the last step of
    /// an upload.
    pub async fn create_content(
        &self,
        n: &dyn ObjectName,
        content: &Content,
        autocreate: bool,
    ) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let qualified = QualifiedContent {
            container: n,
            name: &content.header.name,
            id: &content.header.id,
            version: content.header.version,
        };
        let url = self.content_url(&qualified, "create")?;
        let req = self
            .mutating(self.core.http.post(url), autocreate)
            .header(HEADER_CONTENT_META_LENGTH, content.header.size.to_string())
            .json(&content.chunks);
        self.core.simple(req).await
    }

    pub async fn delete_content(&self, n: &dyn ObjectName) -> Result<(), SdkError> {
        self.core.check_ns(n)?;
        let url = self.content_url(n, "delete")?;
        self.core.simple(self.core.http.post(url)).await
    }
}
