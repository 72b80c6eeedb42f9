use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::Node;

pub const PAYLOAD_SCHEMA_VERSION: u32 = 1;

/// Encodes payload graphs to bytes and back.
///
/// Rewriting happens on decoded [`Node`]s, so implementations only need to
/// preserve the graph faithfully.
pub trait PayloadCodec {
    /// Short identifier recorded in bundle metadata.
    fn name(&self) -> &'static str;

    /// File extension used for resource entries.
    fn extension(&self) -> &'static str;

    fn encode(&self, node: &Node) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Node>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PayloadEnvelope {
    schema_version: u32,
    root: Node,
}

/// JSON with type tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, node: &Node) -> Result<Vec<u8>> {
        if let Some(path) = node.non_finite_path() {
            return Err(Error::Codec(serde::ser::Error::custom(format!(
                "non-finite float at {path} has no JSON form"
            ))));
        }
        let envelope = PayloadEnvelope {
            schema_version: PAYLOAD_SCHEMA_VERSION,
            root: node.clone(),
        };
        Ok(serde_json::to_vec_pretty(&envelope)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Node> {
        let envelope: PayloadEnvelope = serde_json::from_slice(bytes)?;
        Ok(envelope.root)
    }
}

/// Look up a codec by the name recorded in bundle metadata.
pub fn codec_by_name(name: &str) -> Option<Box<dyn PayloadCodec>> {
    match name {
        "json" => Some(Box::new(JsonCodec)),
        _ => None,
    }
}
