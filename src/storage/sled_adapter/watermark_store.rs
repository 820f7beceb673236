use async_trait::async_trait;
use tracing::trace;

use crate::constants::WATERMARKS_TREE;
use crate::ItemId;
use crate::Result;
use crate::StorageError;
use crate::WatermarkStore;

/// Watermarks as decimal strings in their own sled tree
#[derive(Clone)]
pub struct SledWatermarkStore {
    tree: sled::Tree,
}

impl std::fmt::Debug for SledWatermarkStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledWatermarkStore")
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl SledWatermarkStore {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            tree: db.open_tree(WATERMARKS_TREE)?,
        })
    }
}

#[async_trait]
impl WatermarkStore for SledWatermarkStore {
    async fn get(
        &self,
        source_id: &str,
    ) -> Result<Option<ItemId>> {
        let Some(raw) = self.tree.get(source_id)? else {
            return Ok(None);
        };

        let corrupted = |reason: String| StorageError::DataCorruption {
            key: source_id.to_string(),
            reason,
        };
        let text = std::str::from_utf8(&raw).map_err(|e| corrupted(e.to_string()))?;
        let id = text.parse::<ItemId>().map_err(|e| corrupted(e.to_string()))?;
        Ok(Some(id))
    }

    async fn upsert(
        &self,
        source_id: &str,
        id: ItemId,
    ) -> Result<()> {
        self.tree.insert(source_id, id.to_string().as_bytes())?;
        self.tree.flush_async().await?;
        trace!(source_id, %id, "watermark persisted");
        Ok(())
    }
}
