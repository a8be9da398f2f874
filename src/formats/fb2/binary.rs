//! Embedded binary resources
//!
//! FB2 stores images as `<binary id=".." content-type="..">` elements
//! with a base64 payload directly under the root.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::xml::{NodeId, XmlTree};
use crate::document::{DocumentError, ImageData, Result};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Binary id -> node index
#[derive(Debug, Default)]
pub(crate) struct BinaryIndex {
    entries: HashMap<String, NodeId>,
}

impl BinaryIndex {
    /// Index every `<binary>` under the root; the first of duplicate ids wins
    pub fn build(tree: &XmlTree) -> Self {
        let mut entries = HashMap::new();
        for node in tree.child_elements(tree.root(), "binary") {
            let Some(id) = tree.attr(node, "id").filter(|id| !id.is_empty()) else {
                continue;
            };
            entries.entry(id.to_string()).or_insert(node);
        }
        Self { entries }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Decode a resource by id
    pub fn extract(&self, tree: &XmlTree, id: &str) -> Result<ImageData> {
        let node = *self
            .entries
            .get(id)
            .ok_or_else(|| DocumentError::ImageNotFound(id.to_string()))?;

        let content_type = tree
            .attr(node, "content-type")
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(id));

        let payload: String = tree
            .text(node)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let data = STANDARD
            .decode(payload.as_bytes())
            .map_err(|e| DocumentError::ResourceDecodeFailure {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ImageData {
            id: id.to_string(),
            content_type,
            data,
        })
    }
}

fn guess_content_type(id: &str) -> String {
    mime_guess::from_path(id)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}
