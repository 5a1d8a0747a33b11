mod connection;
mod container;
mod container_catalog;
mod image;
mod image_catalog;
mod index;

pub use connection::Connection;
pub use container::{Container, ScopedContainer};
pub use container_catalog::{ContainerCatalog, Containers, CreateOptions, ImageRef};
pub use image::{History, Image};
pub use image_catalog::{DEFAULT_TAG, ImageCatalog, Images};

use chrono::{DateTime, Utc};

/// Engine timestamps are epoch seconds; out-of-range values map to the epoch.
pub(crate) fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
