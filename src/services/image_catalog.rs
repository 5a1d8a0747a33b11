use super::Connection;
use super::image::Image;
use super::index::{Keyed, Snapshot, SnapshotCell};
use crate::domain::{self, ImageRecord};
use crate::domain::records::UNTAGGED;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Tag assumed when a lookup name carries none.
pub const DEFAULT_TAG: &str = "latest";

impl Keyed for ImageRecord {
    fn id(&self) -> &str {
        &self.id
    }

    /// Every usable tag, plus the short form of Docker Hub tags so that
    /// `alpine:3.18` finds `docker.io/library/alpine:3.18`.
    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for tag in self
            .tags()
            .iter()
            .filter(|tag| !tag.is_empty() && tag.as_str() != UNTAGGED)
        {
            keys.push(tag.clone());
            if let Some(short) = domain::hub_short_reference(tag) {
                keys.push(short.to_string());
            }
        }
        keys
    }
}

/// Local snapshot of every image on the engine, indexed by tag and by id.
///
/// The snapshot goes stale as soon as images are pulled or removed elsewhere;
/// call [`ImageCatalog::refresh`] to observe changes. Clones share the same
/// snapshot.
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    conn: Connection,
    snapshot: Arc<SnapshotCell<ImageRecord>>,
}

impl ImageCatalog {
    pub fn new(conn: Connection) -> Result<Self> {
        let catalog = Self {
            conn,
            snapshot: Arc::new(SnapshotCell::default()),
        };
        catalog.refresh()?;
        Ok(catalog)
    }

    pub fn refresh(&self) -> Result<()> {
        let records = self.conn.client().list_images(true)?;
        debug!(count = records.len(), "catálogo de imagens atualizado");
        self.snapshot.replace(records);
        Ok(())
    }

    /// Looks up `name:latest`, or `name` itself when it already carries a tag.
    pub fn get(&self, name: &str) -> Option<Image> {
        self.get_tagged(name, DEFAULT_TAG)
    }

    /// Looks up `name:tag`. A `name` containing `:` is taken as a full
    /// reference and `tag` is ignored.
    pub fn get_tagged(&self, name: &str, tag: &str) -> Option<Image> {
        let wanted = if name.contains(':') {
            name.to_string()
        } else {
            format!("{name}:{tag}")
        };

        let snapshot = self.snapshot.load();
        snapshot
            .by_key(&wanted)
            .map(|record| Image::from_record(record, self.clone()))
    }

    /// Looks up an image by exact id. Anything from the first `:` on is
    /// dropped before the lookup.
    pub fn get_by_id(&self, id: &str) -> Option<Image> {
        let key = id.split(':').next().unwrap_or(id);

        let snapshot = self.snapshot.load();
        snapshot
            .by_id(key)
            .map(|record| Image::from_record(record, self.clone()))
    }

    /// Iterates the current snapshot. Every call starts a new, independent
    /// pass; a later refresh does not affect iterators already created.
    pub fn iter(&self) -> Images {
        Images {
            catalog: self.clone(),
            snapshot: self.snapshot.load(),
            position: 0,
        }
    }

    /// Every tag currently resolvable through [`ImageCatalog::get`]
    pub fn tags(&self) -> Vec<String> {
        self.snapshot.load().keys().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl<'a> IntoIterator for &'a ImageCatalog {
    type Item = Image;
    type IntoIter = Images;

    fn into_iter(self) -> Images {
        self.iter()
    }
}

/// One pass over an image snapshot.
#[derive(Debug)]
pub struct Images {
    catalog: ImageCatalog,
    snapshot: Arc<Snapshot<ImageRecord>>,
    position: usize,
}

impl Iterator for Images {
    type Item = Image;

    fn next(&mut self) -> Option<Image> {
        let record = self.snapshot.records().get(self.position)?;
        self.position += 1;
        Some(Image::from_record(record, self.catalog.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.snapshot.records().len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Images {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockEngine;

    fn catalog_with(mock: &Arc<MockEngine>) -> ImageCatalog {
        ImageCatalog::new(Connection::new(mock.clone())).unwrap()
    }

    #[test]
    fn get_defaults_to_latest_tag() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("aa11", &["alpine:latest", "alpine:3.18"], None);
        let catalog = catalog_with(&mock);

        assert_eq!(catalog.get("alpine").unwrap().id, "aa11");
        assert_eq!(catalog.get_tagged("alpine", "3.18").unwrap().id, "aa11");
        assert!(catalog.get_tagged("alpine", "3.19").is_none());
    }

    #[test]
    fn name_with_colon_overrides_tag() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("aa11", &["alpine:3.18"], None);
        let catalog = catalog_with(&mock);

        let image = catalog.get_tagged("alpine:3.18", "latest").unwrap();
        assert_eq!(image.id, "aa11");
    }

    #[test]
    fn untagged_sentinel_never_resolves() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("aa11", &["<none>:<none>"], None);
        let catalog = catalog_with(&mock);

        assert!(catalog.get("<none>:<none>").is_none());
        assert!(catalog.get_tagged("<none>", "<none>").is_none());
        assert!(catalog.get_by_id("aa11").is_some());
        assert!(catalog.tags().is_empty());
    }

    #[test]
    fn get_by_id_ignores_suffix_after_colon() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("abc123", &["app:1"], None);
        let catalog = catalog_with(&mock);

        let plain = catalog.get_by_id("abc123").map(|i| i.id);
        let qualified = catalog.get_by_id("abc123:def").map(|i| i.id);
        assert_eq!(plain, qualified);
        assert_eq!(plain.as_deref(), Some("abc123"));
    }

    #[test]
    fn docker_hub_tags_resolve_by_short_and_full_form() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image(
            "aa11",
            &["docker.io/library/alpine:3.18", "quay.io/app/api:2"],
            None,
        );
        let catalog = catalog_with(&mock);

        assert_eq!(catalog.get("alpine:3.18").unwrap().id, "aa11");
        assert_eq!(catalog.get_tagged("alpine", "3.18").unwrap().id, "aa11");
        assert_eq!(
            catalog.get("docker.io/library/alpine:3.18").unwrap().id,
            "aa11"
        );
        assert_eq!(catalog.get("quay.io/app/api:2").unwrap().id, "aa11");
        assert!(catalog.get("app/api:2").is_none());
    }

    #[test]
    fn lookups_are_exact() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("abc123", &["app:1"], None);
        let catalog = catalog_with(&mock);

        assert!(catalog.get_by_id("abc").is_none());
        assert!(catalog.get("ap:1").is_none());
    }

    #[test]
    fn refresh_is_required_to_see_new_images() {
        let mock = Arc::new(MockEngine::new());
        let catalog = catalog_with(&mock);

        mock.add_image("bb22", &["redis:7"], None);
        assert!(catalog.get("redis:7").is_none());

        catalog.refresh().unwrap();
        assert!(catalog.get("redis:7").is_some());
    }

    #[test]
    fn refresh_propagates_transport_errors() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("aa11", &["alpine:latest"], None);
        let catalog = catalog_with(&mock);

        mock.set_fail_on("list_images");
        assert!(catalog.refresh().is_err());
        // the previous snapshot stays in place
        assert!(catalog.get("alpine").is_some());
    }

    #[test]
    fn iterators_are_independent_and_restartable() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("aa11", &["alpine:latest"], None);
        mock.add_image("bb22", &["redis:7"], None);
        mock.add_image("cc33", &[], None);
        let catalog = catalog_with(&mock);

        let mut first = catalog.iter();
        assert_eq!(first.len(), 3);
        assert_eq!(first.next().unwrap().id, "aa11");

        let second: Vec<String> = catalog.iter().map(|image| image.id).collect();
        assert_eq!(second, vec!["aa11", "bb22", "cc33"]);

        assert_eq!(first.next().unwrap().id, "bb22");
        assert_eq!(first.next().unwrap().id, "cc33");
        assert!(first.next().is_none());

        assert_eq!(catalog.len(), 3);
        assert_eq!((&catalog).into_iter().count(), 3);
    }

    #[test]
    fn iterator_keeps_its_snapshot_across_refresh() {
        let mock = Arc::new(MockEngine::new());
        mock.add_image("aa11", &["alpine:latest"], None);
        let catalog = catalog_with(&mock);

        let iter = catalog.iter();
        mock.add_image("bb22", &["redis:7"], None);
        catalog.refresh().unwrap();

        assert_eq!(iter.count(), 1);
        assert_eq!(catalog.iter().count(), 2);
    }

    #[test]
    fn lists_all_images() {
        let mock = Arc::new(MockEngine::new());
        catalog_with(&mock);

        assert!(mock.get_commands().contains(&"list_images:all".to_string()));
    }
}
