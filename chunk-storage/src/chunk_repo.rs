use std::io;
use std::sync::Arc;

use tracing::warn;

use crate::error::StoreError;
use crate::file_repo::{FileReader, FileRepository, FileWriter};
use crate::mover::{MoveOp, MoveOrder, MoveSink};

const CHUNK_NAME_LEN: usize = 64;

/// Chunk-level view over an ordered list of tiers (fastest first).
///
/// Adds name validation, tier dispatch and write-ahead intent recording on
/// top of [`FileRepository`].
pub struct ChunkRepository {
    subs: Vec<Arc<FileRepository>>,
    log: Option<Arc<FileRepository>>,
    mover: Option<Arc<dyn MoveSink>>,
}

impl ChunkRepository {
    pub fn new(subs: Vec<Arc<FileRepository>>) -> Self {
        ChunkRepository {
            subs,
            log: None,
            mover: None,
        }
    }

    /// Attach a log repository recording write intents.
    pub fn with_log(mut self, log: Arc<FileRepository>) -> Self {
        self.log = Some(log);
        self
    }

    /// Attach the mover queue used by [`ChunkRepository::push_move_order`].
    pub fn with_move_sink(mut self, sink: Arc<dyn MoveSink>) -> Self {
        self.mover = Some(sink);
        self
    }

    pub fn tiers(&self) -> &[Arc<FileRepository>] {
        &self.subs
    }

    /// Lock every tier (and the log repository) with the node identity.
    pub fn lock(&self, ns: &str, url: &str) -> Result<(), StoreError> {
        if let Some(log) = &self.log {
            log.lock(ns, url)?;
        }
        for sub in &self.subs {
            sub.lock(ns, url)?;
        }
        Ok(())
    }

    /// Enqueue a tier migration for a chunk. Never blocks; a missing mover is
    /// only logged.
    pub fn push_move_order(&self, src: usize, chunkid: &str, op: MoveOp) {
        match &self.mover {
            Some(sink) => sink.push(MoveOrder {
                src,
                chunkid: chunkid.to_string(),
                op,
            }),
            None => warn!(chunkid, "move order dropped, no mover attached"),
        }
    }

    /// Only 64-character uppercase hexadecimal names address chunks; input is
    /// folded to uppercase before the check.
    pub fn validate_name(name: &str) -> Result<String, StoreError> {
        let name = name.to_uppercase();
        if name.len() != CHUNK_NAME_LEN || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidChunkName);
        }
        Ok(name)
    }

    pub async fn has(&self, name: &str) -> Result<bool, StoreError> {
        let name = Self::validate_name(name)?;
        for sub in &self.subs {
            if sub.has(&name).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// First tier holding the chunk wins; a missing entry means "try the next
    /// tier", anything else is fatal.
    pub async fn get(&self, name: &str) -> Result<FileReader, StoreError> {
        let name = Self::validate_name(name)?;
        for sub in &self.subs {
            match sub.get(&name).await {
                Ok(reader) => return Ok(reader),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::NotFound)
    }

    pub async fn del(&self, name: &str) -> Result<(), StoreError> {
        let name = Self::validate_name(name)?;
        for sub in &self.subs {
            match sub.del(&name).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::NotFound)
    }

    /// Acquire a writer: record intent on the log repository, then take the
    /// first tier that accepts. A tier reporting a duplicate stops the scan,
    /// duplicate writes must not silently land on a slower tier.
    pub async fn put(&self, name: &str, content_length: u64) -> Result<ChunkWriter, StoreError> {
        let name = Self::validate_name(name)?;

        let mut intent = None;
        if let Some(log) = &self.log {
            match log.put(&name, 0).await {
                Ok(w) => intent = Some(w),
                Err(e) => warn!(chunkid = %name, error = %e, "intent record failed"),
            }
        }

        let mut last_err: Option<StoreError> = None;
        for (tier, sub) in self.subs.iter().enumerate() {
            match sub.put(&name, content_length).await {
                Ok(data) => {
                    return Ok(ChunkWriter {
                        data,
                        intent,
                        tier,
                    })
                }
                Err(e) if e.is_chunk_exists() => {
                    abort_intent(&mut intent).await;
                    return Err(e);
                }
                Err(e) => last_err = Some(e),
            }
        }

        abort_intent(&mut intent).await;
        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no tier accepted the chunk").into()))
    }

    /// Listing is served from the fastest tier.
    pub fn list(
        &self,
        marker: &str,
        prefix: &str,
        max: usize,
    ) -> Result<(Vec<String>, bool), StoreError> {
        if !marker.is_empty() && !is_hex_like(marker) {
            return Err(StoreError::InvalidListMarker);
        }
        if !prefix.is_empty() && !is_hex_like(prefix) {
            return Err(StoreError::InvalidListPrefix);
        }
        match self.subs.first() {
            Some(sub) => sub.list(marker, prefix, max),
            None => Ok((Vec::new(), false)),
        }
    }
}

fn is_hex_like(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

async fn abort_intent(intent: &mut Option<FileWriter>) {
    if let Some(mut w) = intent.take() {
        if let Err(e) = w.abort().await {
            warn!(error = %e, "intent cleanup failed");
        }
    }
}

/// Writer pairing the data tier entry with its write-ahead intent; the intent
/// is cleared whichever way the data writer terminates.
pub struct ChunkWriter {
    data: FileWriter,
    intent: Option<FileWriter>,
    tier: usize,
}

impl ChunkWriter {
    pub fn name(&self) -> &str {
        self.data.name()
    }

    /// Index of the tier holding the data.
    pub fn tier(&self) -> usize {
        self.tier
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<(), StoreError> {
        self.data.write(buf).await
    }

    pub fn set_attr(&mut self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        self.data.set_attr(name, value)
    }

    pub async fn sync(&mut self) -> Result<(), StoreError> {
        self.data.sync().await
    }

    pub async fn commit(&mut self) -> Result<(), StoreError> {
        let res = self.data.commit().await;
        abort_intent(&mut self.intent).await;
        res
    }

    pub async fn abort(&mut self) -> Result<(), StoreError> {
        let res = self.data.abort().await;
        abort_intent(&mut self.intent).await;
        res
    }
}
