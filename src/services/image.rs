use super::{ImageCatalog, from_epoch};
use crate::domain::{self, HistoryRecord, ImageRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

/// One image as it was in the catalog snapshot it was resolved from.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: String,
    /// `None` for base images
    pub parent_id: Option<String>,
    pub created: DateTime<Utc>,
    pub size: u64,
    pub virtual_size: u64,
    pub labels: HashMap<String, String>,
    pub tags: Vec<String>,
    catalog: ImageCatalog,
    history: OnceLock<Vec<History>>,
}

impl Image {
    pub(crate) fn from_record(record: &ImageRecord, catalog: ImageCatalog) -> Self {
        Self {
            id: record.id.clone(),
            parent_id: Some(record.parent_id.clone()).filter(|id| !id.is_empty()),
            created: from_epoch(record.created),
            size: record.size,
            virtual_size: record.virtual_size,
            labels: record.labels.clone(),
            tags: record.tags().to_vec(),
            catalog,
            history: OnceLock::new(),
        }
    }

    pub fn short_id(&self) -> &str {
        domain::short_id(&self.id)
    }

    /// Parent image from the catalog's current snapshot; `None` for base
    /// images or when the parent was pruned.
    pub fn parent(&self) -> Option<Image> {
        self.parent_id
            .as_deref()
            .and_then(|id| self.catalog.get_by_id(id))
    }

    /// Ancestors from the direct parent up to the first one the catalog
    /// cannot resolve.
    pub fn lineage(&self) -> Vec<Image> {
        let mut seen = HashSet::from([self.id.clone()]);
        let mut chain = Vec::new();
        let mut current = self.parent();

        while let Some(image) = current {
            if !seen.insert(image.id.clone()) {
                break;
            }
            current = image.parent();
            chain.push(image);
        }

        chain
    }

    /// Build layers, newest first. Fetched on first call and kept for the
    /// lifetime of this value; resolve the image again to see a new history.
    pub fn history(&self) -> Result<&[History]> {
        if let Some(rows) = self.history.get() {
            return Ok(rows);
        }

        let records = self.catalog.connection().client().image_history(&self.id)?;
        debug!(image = self.short_id(), layers = records.len(), "histórico carregado");
        let rows = records
            .iter()
            .map(|record| History::from_record(record, self.catalog.clone()))
            .collect();

        Ok(self.history.get_or_init(|| rows))
    }
}

/// One build layer of an image.
#[derive(Debug, Clone)]
pub struct History {
    pub id: String,
    pub created_by: String,
    pub created: DateTime<Utc>,
    pub size: u64,
    pub tags: Vec<String>,
    pub comment: String,
    catalog: ImageCatalog,
}

impl History {
    pub(crate) fn from_record(record: &HistoryRecord, catalog: ImageCatalog) -> Self {
        Self {
            id: record.id.clone(),
            created_by: record.created_by.clone(),
            created: from_epoch(record.created),
            size: record.size,
            tags: record.tags.clone(),
            comment: record.comment.clone(),
            catalog,
        }
    }

    /// The image this layer produced, if it is still in the catalog
    pub fn image(&self) -> Option<Image> {
        self.catalog.get_by_id(&self.id)
    }

    pub fn short_id(&self) -> &str {
        domain::short_id(&self.id)
    }
}
