//! End-to-end coverage of the chunk HTTP surface: a real server on an
//! ephemeral port, a plain HTTP client, a temp-dir repository.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::mpsc;

use chunk_storage::{ChunkRepository, FileRepository};
use rawx::headers::ATTR_MAP;
use rawx::server::{self, RawxService};

const CHUNK_ID: &str = "A7C8000000000000000000000000000000000000000000000000000000000001";

struct TestNode {
    root: TempDir,
    base: String,
}

async fn start_node() -> TestNode {
    let root = TempDir::new().unwrap();
    let repo = ChunkRepository::new(vec![Arc::new(FileRepository::new(root.path()))]);
    let service = Arc::new(RawxService::new("NS", "127.0.0.1:0", repo));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(service, listener));
    TestNode {
        root,
        base: format!("http://{addr}"),
    }
}

fn meta_headers(req: reqwest::RequestBuilder, chunkid: &str) -> reqwest::RequestBuilder {
    req.header("X-Oio-Chunk-Meta-Container-Id", "CID")
        .header("X-Oio-Chunk-Meta-Content-Path", "path")
        .header("X-Oio-Chunk-Meta-Content-Id", "0123")
        .header("X-Oio-Chunk-Meta-Content-Version", "1")
        .header("X-Oio-Chunk-Meta-Content-Size", "4000")
        .header("X-Oio-Chunk-Meta-Content-Chunksnb", "1")
        .header("X-Oio-Chunk-Meta-Content-Storage-Policy", "SINGLE")
        .header("X-Oio-Chunk-Meta-Content-Mime-Type", "application/octet-stream")
        .header("X-Oio-Chunk-Meta-Content-Chunk-Method", "plain")
        .header("X-Oio-Chunk-Meta-Chunk-Id", chunkid)
        .header("X-Oio-Chunk-Meta-Chunk-Size", "4000")
        .header("X-Oio-Chunk-Meta-Chunk-Pos", "0")
}

fn chunk_file(root: &Path, chunkid: &str) -> std::path::PathBuf {
    root.join(&chunkid[..3]).join(chunkid)
}

#[tokio::test]
async fn test_put_get_delete_roundtrip() {
    let node = start_node().await;
    let client = reqwest::Client::new();
    let body = vec![0x42u8; 4000];

    // PUT without a chunkhash header: accepted, hash computed and echoed.
    let resp = meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let echoed = resp
        .headers()
        .get("chunkhash")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(echoed.len(), 32);
    assert_eq!(echoed, echoed.to_uppercase());

    // The file was published under the hashed path, with its attributes.
    let path = chunk_file(node.root.path(), CHUNK_ID);
    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert_eq!(
        xattr::get(&path, "user.grid.chunk.id").unwrap().as_deref(),
        Some(CHUNK_ID.as_bytes())
    );
    assert_eq!(
        xattr::get(&path, "user.grid.chunk.hash").unwrap().as_deref(),
        Some(echoed.as_bytes())
    );

    // GET: body and every persisted meta header come back.
    let resp = client
        .get(format!("{}/{CHUNK_ID}", node.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    for (_, header) in ATTR_MAP.iter() {
        assert!(resp.headers().contains_key(*header), "missing {header}");
    }
    assert_eq!(
        resp.headers()
            .get("X-Oio-Chunk-Meta-Chunk-Hash")
            .unwrap()
            .to_str()
            .unwrap(),
        echoed
    );
    assert_eq!(resp.bytes().await.unwrap(), Bytes::from(body));

    // DELETE once: gone. DELETE twice: 404.
    let resp = client
        .delete(format!("{}/{CHUNK_ID}", node.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!path.exists());
    let resp = client
        .delete(format!("{}/{CHUNK_ID}", node.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_put_verifies_announced_hash() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    let resp = meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
        .header("chunkhash", "00000000000000000000000000000000")
        .body(vec![1u8; 128])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    assert!(resp
        .headers()
        .get("X-Error")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("MD5"));

    // Nothing under the final name, no leftover pending file either.
    let path = chunk_file(node.root.path(), CHUNK_ID);
    assert!(!path.exists());
    assert!(!path.with_extension("pending").exists());
}

#[tokio::test]
async fn test_put_accepts_matching_hash_case_insensitively() {
    let node = start_node().await;
    let client = reqwest::Client::new();
    let body = b"four thousand bytes it is not".to_vec();

    use md5::Digest;
    let hash = hex::encode(md5::Md5::digest(&body)); // lowercase on purpose

    let resp = meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
        .header("chunkhash", hash)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_put_missing_meta_header_is_rejected() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    // Full header set minus the container id.
    let resp = client
        .put(format!("{}/{CHUNK_ID}", node.base))
        .header("X-Oio-Chunk-Meta-Content-Path", "path")
        .header("X-Oio-Chunk-Meta-Content-Id", "0123")
        .header("X-Oio-Chunk-Meta-Content-Version", "1")
        .header("X-Oio-Chunk-Meta-Content-Size", "3")
        .header("X-Oio-Chunk-Meta-Content-Chunksnb", "1")
        .header("X-Oio-Chunk-Meta-Content-Storage-Policy", "SINGLE")
        .header("X-Oio-Chunk-Meta-Content-Mime-Type", "text/plain")
        .header("X-Oio-Chunk-Meta-Content-Chunk-Method", "plain")
        .header("X-Oio-Chunk-Meta-Chunk-Id", CHUNK_ID)
        .header("X-Oio-Chunk-Meta-Chunk-Size", "3")
        .header("X-Oio-Chunk-Meta-Chunk-Pos", "0")
        .body("abc")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(!chunk_file(node.root.path(), CHUNK_ID).exists());
}

#[tokio::test]
async fn test_invalid_chunk_name() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    for bad in ["shortname", "ZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZZ"] {
        let resp = meta_headers(client.put(format!("{}/{bad}", node.base)), bad)
            .body("x")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "name {bad}");
    }

    let resp = client
        .get(format!("{}/nothex", node.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_get_missing_chunk_is_404() {
    let node = start_node().await;
    let resp = reqwest::get(format!("{}/{CHUNK_ID}", node.base)).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_concurrent_puts_single_winner() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    // First upload stalls mid-body while holding the pending file.
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);
    tx.send(Ok(Bytes::from_static(b"first half"))).await.unwrap();
    let stalled = tokio::spawn(
        meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
            .header("Content-Length", "20")
            .body(reqwest::Body::wrap_stream(
                tokio_stream::wrappers::ReceiverStream::new(rx),
            ))
            .send(),
    );

    // Give the server a moment to open the pending file.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Second upload of the same chunk must lose with 403.
    let resp = meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
        .body(vec![9u8; 20])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Release the first upload, it completes normally.
    tx.send(Ok(Bytes::from_static(b"second hal"))).await.unwrap();
    drop(tx);
    let resp = stalled.await.unwrap().unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_stat_counters() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    let _ = client
        .get(format!("{}/{CHUNK_ID}", node.base))
        .send()
        .await
        .unwrap();

    let resp = client.get(format!("{}/stat", node.base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let text = resp.text().await.unwrap();

    // Two lines per slot, counters and timers.
    assert!(text.contains("counter.rep.hits.get 1\n"));
    assert!(text.contains("counter.rep.hits.404 1\n"));
    assert!(text.contains("counter.rep.hits "));
    assert!(text.contains("timer.rep.time.get "));
    assert!(text.contains("timer.rep.time "));

    // /info serves the same dump.
    let info = client
        .get(format!("{}/info", node.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(info.contains("counter.rep.hits"));
}

#[tokio::test]
async fn test_request_correlation_headers() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/stat", node.base))
        .header("X-oio-reqid", "tnx0123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers().get("X-oio-reqid").unwrap(), "tnx0123");
    assert_eq!(resp.headers().get("X-trans-id").unwrap(), "tnx0123");

    let resp = client
        .get(format!("{}/stat", node.base))
        .header("X-trans-id", "tnx0456")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers().get("X-oio-reqid").unwrap(), "tnx0456");
}

#[tokio::test]
async fn test_list_names_uploaded_chunks() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    let other = format!("{}02", &CHUNK_ID[..62]);
    for id in [CHUNK_ID, other.as_str()] {
        let resp = meta_headers(client.put(format!("{}/{id}", node.base)), id)
            .body(vec![7u8; 16])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    let resp = client
        .get(format!("{}/list?prefix=A7C8", node.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("X-Oio-List-Truncated").unwrap(), "false");
    let text = resp.text().await.unwrap();
    let mut lines: Vec<&str> = text.lines().collect();
    lines.sort_unstable();
    assert_eq!(lines, vec![CHUNK_ID, other.as_str()]);
}

#[tokio::test]
async fn test_compressing_node_stores_zlib() {
    use std::io::Read;

    let root = TempDir::new().unwrap();
    let repo = ChunkRepository::new(vec![Arc::new(FileRepository::new(root.path()))]);
    let service = Arc::new(RawxService::new("NS", "127.0.0.1:0", repo).with_compression(true));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(service, listener));

    let client = reqwest::Client::new();
    let body = vec![0x5Au8; 8192]; // compresses well

    let resp = meta_headers(client.put(format!("http://{addr}/{CHUNK_ID}")), CHUNK_ID)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // The announced hash covers the plain bytes, not the stored ones.
    use md5::Digest;
    let expected = hex::encode_upper(md5::Md5::digest(&body));
    assert_eq!(resp.headers().get("chunkhash").unwrap(), expected.as_str());

    // On disk: smaller, marked zlib, inflating restores the original.
    let path = chunk_file(root.path(), CHUNK_ID);
    let stored = std::fs::read(&path).unwrap();
    assert!(stored.len() < body.len());
    assert_eq!(
        xattr::get(&path, "user.grid.compression").unwrap().as_deref(),
        Some(b"zlib".as_ref())
    );
    let mut inflated = Vec::new();
    flate2::read::ZlibDecoder::new(stored.as_slice())
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(inflated, body);
}

#[tokio::test]
async fn test_aborted_upload_leaves_nothing() {
    let node = start_node().await;
    let client = reqwest::Client::new();

    // Announce 100 bytes, deliver 50, then drop the connection.
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);
    tx.send(Ok(Bytes::from(vec![1u8; 50]))).await.unwrap();
    let pending = tokio::spawn(
        meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
            .header("Content-Length", "100")
            .body(reqwest::Body::wrap_stream(
                tokio_stream::wrappers::ReceiverStream::new(rx),
            ))
            .send(),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    drop(tx);
    let _ = pending.await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // Neither the final name nor a stale pending file survive.
    let path = chunk_file(node.root.path(), CHUNK_ID);
    assert!(!path.exists());
    assert!(!path.with_extension("pending").exists());

    // The name is usable again.
    let resp = meta_headers(client.put(format!("{}/{CHUNK_ID}", node.base)), CHUNK_ID)
        .body(vec![2u8; 100])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
