//! Object-level glue: prepare, plan, fan out, commit.

use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::io::AsyncRead;

use crate::config::Config;
use crate::container::ContainerClient;
use crate::directory::DirectoryClient;
use crate::download::ChunksReader;
use crate::error::SdkError;
use crate::metachunk::{organize, plan};
use crate::name::{ObjectName, UserName};
use crate::polyput::PolyPut;
use crate::proxy::http_client;
use crate::slice_reader::SliceReader;
use crate::RAWX_HEADER_PREFIX;

/// Unique id of an end user, used as the container id in chunk metadata:
/// SHA-256 over the account name, a zero byte, and the user name.
pub fn compute_user_id<N: UserName + ?Sized>(name: &N) -> [u8; 32] {
    let mut h = Sha256::new();
    if !name.account().is_empty() {
        h.update(name.account().as_bytes());
        h.update([0u8]);
    }
    h.update(name.user().as_bytes());
    h.finalize().into()
}

/// High-level object storage client over the placement clients.
pub struct ObjectClient {
    directory: DirectoryClient,
    container: ContainerClient,
    http: reqwest::Client,
}

impl ObjectClient {
    pub fn new(ns: &str, config: Arc<dyn Config>) -> Result<ObjectClient, SdkError> {
        Ok(ObjectClient {
            directory: DirectoryClient::new(ns, config.clone())?,
            container: ContainerClient::new(ns, config)?,
            http: http_client()?,
        })
    }

    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    pub fn container(&self) -> &ContainerClient {
        &self.container
    }

    /// Upload `size` bytes from `src` as the object `n`.
    ///
    /// Placement discovery, meta-chunk planning, one fan-out PUT per
    /// meta-chunk, then the metadata commit. An erasure-coded placement is
    /// refused before any byte is sent.
    pub async fn put_content<R: AsyncRead + Unpin>(
        &self,
        n: &dyn ObjectName,
        size: u64,
        autocreate: bool,
        src: &mut R,
    ) -> Result<(), SdkError> {
        let mut content = self.container.prepare_content(n, size, autocreate).await?;
        let metas = plan(&content.chunks, size)?;

        // An explicit id on the name supersedes the proxy-assigned one.
        let id = if !n.id().is_empty() {
            n.id().to_string()
        } else if !content.header.id.is_empty() {
            content.header.id.clone()
        } else {
            return Err(SdkError::MissingContentId);
        };
        let version = if n.version() != 0 {
            n.version()
        } else if content.header.version != 0 {
            content.header.version
        } else {
            return Err(SdkError::MissingVersion);
        };
        content.header.id = id;
        content.header.version = version;
        content.header.size = size;
        if content.header.name.is_empty() {
            content.header.name = n.path().to_string();
        }

        let container_id = hex::encode_upper(compute_user_id(n));
        let reqid: String = {
            let mut rng = rand::thread_rng();
            (0..16).map(|_| format!("{:X}", rng.gen_range(0..16))).collect()
        };

        for (index, mc) in metas.iter().enumerate() {
            let mut pp = PolyPut::with_client(self.http.clone());
            for chunk in &content.chunks {
                pp.add_target(&chunk.url);
            }
            pp.add_header("X-oio-req-id", &reqid);
            let meta = |suffix: &str| format!("{RAWX_HEADER_PREFIX}{suffix}");
            pp.add_header(&meta("container-id"), &container_id);
            pp.add_header(&meta("content-path"), n.path());
            pp.add_header(&meta("content-id"), &content.header.id);
            pp.add_header(&meta("content-version"), &content.header.version.to_string());
            pp.add_header(&meta("content-size"), &size.to_string());
            pp.add_header(&meta("content-chunksnb"), &metas.len().to_string());
            pp.add_header(&meta("content-storage-policy"), &content.header.policy);
            pp.add_header(&meta("content-chunk-method"), &content.header.chunk_method);
            pp.add_header(&meta("content-mime-type"), &content.header.mime_type);
            pp.add_header(&meta("chunk-pos"), &index.to_string());
            // The chunk-id header varies per target, the fan-out sets it.

            let mut slice = SliceReader::new(&mut *src, mc.size);
            pp.execute(&mut slice).await?;
        }

        self.container
            .create_content(n, &content, autocreate)
            .await
    }

    /// A sequential reader over the stored object.
    pub async fn get_content(&self, n: &dyn ObjectName) -> Result<ChunksReader, SdkError> {
        let mut content = self.container.show_content(n).await?;
        // Only HTTP chunk locations are managed.
        content.chunks.retain(|c| c.url.starts_with("http://"));
        let metas = organize(&content.chunks);
        Ok(ChunksReader::new(self.http.clone(), metas))
    }

    pub async fn delete_content(&self, n: &dyn ObjectName) -> Result<(), SdkError> {
        self.container.delete_content(n).await
    }
}
