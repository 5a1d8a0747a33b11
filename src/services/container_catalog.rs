use super::image::Image;
use super::index::{Keyed, Snapshot, SnapshotCell};
use super::{Connection, Container, DEFAULT_TAG};
use crate::domain::{ContainerRecord, ContainerSpec};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Keyed for ContainerRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn keys(&self) -> Vec<String> {
        self.names
            .iter()
            .map(|name| name.strip_prefix('/').unwrap_or(name))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Image argument of [`ContainerCatalog::create`]: a resolved image or a raw
/// reference (tag or id).
#[derive(Debug, Clone, Copy)]
pub enum ImageRef<'a> {
    Image(&'a Image),
    Reference(&'a str),
}

impl ImageRef<'_> {
    fn as_str(&self) -> &str {
        match self {
            ImageRef::Image(image) => &image.id,
            ImageRef::Reference(reference) => reference,
        }
    }
}

impl<'a> From<&'a Image> for ImageRef<'a> {
    fn from(image: &'a Image) -> Self {
        ImageRef::Image(image)
    }
}

impl<'a> From<&'a str> for ImageRef<'a> {
    fn from(reference: &'a str) -> Self {
        ImageRef::Reference(reference)
    }
}

impl<'a> From<&'a String> for ImageRef<'a> {
    fn from(reference: &'a String) -> Self {
        ImageRef::Reference(reference)
    }
}

#[derive(Debug, Clone)]
pub struct CreateOptions<'a> {
    /// Pull the image when it is not present locally
    pub pull: bool,
    /// Remove the container when its scoped run ends
    pub remove_on_exit: bool,
    pub spec: ContainerSpec<'a>,
}

impl Default for CreateOptions<'_> {
    fn default() -> Self {
        Self {
            pull: true,
            remove_on_exit: false,
            spec: ContainerSpec::default(),
        }
    }
}

/// Local snapshot of the engine's containers, indexed by name and by id.
#[derive(Debug, Clone)]
pub struct ContainerCatalog {
    conn: Connection,
    all: bool,
    snapshot: Arc<SnapshotCell<ContainerRecord>>,
}

impl ContainerCatalog {
    /// Lists containers right away; `all` includes stopped ones.
    pub fn new(conn: Connection, all: bool) -> Result<Self> {
        let catalog = Self {
            conn,
            all,
            snapshot: Arc::new(SnapshotCell::default()),
        };
        catalog.refresh()?;
        Ok(catalog)
    }

    pub fn refresh(&self) -> Result<()> {
        let records = self.conn.client().list_containers(self.all)?;
        debug!(count = records.len(), all = self.all, "catálogo de containers atualizado");
        self.snapshot.replace(records);
        Ok(())
    }

    /// Resolves by name (without the leading `/`), then by full id.
    /// No prefix matching.
    pub fn get(&self, identifier: &str) -> Option<Container> {
        let snapshot = self.snapshot.load();
        snapshot
            .by_key(identifier)
            .or_else(|| snapshot.by_id(identifier))
            .map(|record| Container::from_record(record, self.conn.clone()))
    }

    /// Creates a container and returns it resolved from the refreshed catalog.
    ///
    /// When the image is not present locally it is pulled first, unless
    /// `options.pull` is false: then nothing is created and `Ok(None)` is
    /// returned.
    pub fn create<'a>(
        &self,
        image: impl Into<ImageRef<'a>>,
        options: &CreateOptions,
    ) -> Result<Option<Container>> {
        let image = image.into();
        let reference = image.as_str();
        let client = self.conn.client();

        let images = self.conn.images()?;
        let present = images.get(reference).is_some() || images.get_by_id(reference).is_some();

        if !present {
            if !options.pull {
                debug!(image = reference, "imagem ausente e pull desativado; nada criado");
                return Ok(None);
            }

            let (repository, tag) = split_reference(reference);
            info!("Baixando imagem {repository}:{tag}...");
            client.pull(repository, tag)?;
        }

        let created = client.create_container(reference, &options.spec)?;
        for warning in &created.warnings {
            warn!("{warning}");
        }
        info!(
            "Container {} criado a partir de {reference}",
            crate::domain::short_id(&created.id)
        );

        self.refresh()?;

        let container = self
            .get(&created.id)
            .with_context(|| format!("container {} não aparece após refresh", created.id))?;

        Ok(Some(container.with_remove_on_exit(options.remove_on_exit)))
    }

    /// Iterates the current snapshot; each call is an independent pass.
    pub fn iter(&self) -> Containers {
        Containers {
            conn: self.conn.clone(),
            snapshot: self.snapshot.load(),
            position: 0,
        }
    }

    /// Every name currently resolvable through [`ContainerCatalog::get`]
    pub fn names(&self) -> Vec<String> {
        self.snapshot.load().keys().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &'a ContainerCatalog {
    type Item = Container;
    type IntoIter = Containers;

    fn into_iter(self) -> Containers {
        self.iter()
    }
}

/// One pass over a container snapshot.
#[derive(Debug)]
pub struct Containers {
    conn: Connection,
    snapshot: Arc<Snapshot<ContainerRecord>>,
    position: usize,
}

impl Iterator for Containers {
    type Item = Container;

    fn next(&mut self) -> Option<Container> {
        let record = self.snapshot.records().get(self.position)?;
        self.position += 1;
        Some(Container::from_record(record, self.conn.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.snapshot.records().len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Containers {}

/// Splits `repo[:tag]` for a pull. A `:` followed by a `/` belongs to a
/// registry port, not to a tag.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') && !repository.is_empty() => {
            (repository, tag)
        }
        _ => (reference, DEFAULT_TAG),
    }
}
