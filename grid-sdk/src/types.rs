//! Wire types shared with the proxy and the directory services.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One object part stored on a blob node.
///
/// `pos` is a dotted string `meta[.intra[p]]`: the meta-chunk ordinal, the
/// in-meta ordinal, and a trailing `p` marking parity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    pub url: String,
    #[serde(rename = "pos")]
    pub position: String,
    pub size: u64,
    pub hash: String,
}

/// Content identity assigned during *prepare*; explicit caller values win
/// over these.
#[derive(Debug, Clone, Default)]
pub struct ContentHeader {
    pub id: String,
    pub name: String,
    pub policy: String,
    pub version: u64,
    pub size: u64,
    pub chunk_method: String,
    pub mime_type: String,
}

/// The full description of a stored object: header, chunk set, properties.
#[derive(Debug, Clone, Default)]
pub struct Content {
    pub header: ContentHeader,
    pub chunks: Vec<Chunk>,
    pub properties: Vec<Property>,
    pub system: Vec<Property>,
}

/// A key/value pair bound to a container or content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: String,
}

/// A service item managed by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub seq: u64,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "host")]
    pub url: String,
    #[serde(default)]
    pub args: String,
}

/// Everything the directory knows about a reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefDump {
    #[serde(rename = "dir", default)]
    pub directory: Vec<Service>,
    #[serde(rename = "srv", default)]
    pub services: Vec<Service>,
    #[serde(rename = "props", default)]
    pub properties: HashMap<String, String>,
}

/// One entry of a container listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    #[serde(rename = "ver", default)]
    pub version: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub ctime: u64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub policy: String,
}

/// Output of a container listing: objects and container properties.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerListing {
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub properties: Vec<Property>,
}
