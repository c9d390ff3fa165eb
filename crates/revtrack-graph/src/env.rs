/// Context shared by every graph of a document: configuration and the shape
/// factories used to rebuild drawing and embedded-object payloads.
use std::collections::BTreeMap;

use crate::config::GraphConfig;
use crate::edit::{Geometry, ShapePayload};
use crate::error::{GraphError, Result};

/// How one kind of shape is rebuilt from its persisted attributes.
#[derive(Debug, Clone, Default)]
pub struct ShapeFactory {
    /// Whether the shape wraps an embedded object and must carry a reference to it.
    pub embeds_object: bool,
    /// Style attributes applied unless the stored shape overrides them.
    pub default_style: BTreeMap<String, String>,
}

/// Stored attributes of a shape, before a factory rebuilds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeRecord {
    pub name: String,
    pub shape_kind: String,
    pub geometry: Geometry,
    pub style: BTreeMap<String, String>,
    pub object: Option<String>,
}

/// Registry of shape factories keyed by shape kind.
#[derive(Debug, Clone, Default)]
pub struct ShapeCatalog {
    factories: BTreeMap<String, ShapeFactory>,
}

impl ShapeCatalog {
    /// An empty catalog; every shape kind must be registered before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the drawing primitives and embedded-object kinds every
    /// document can contain.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        for kind in ["rect", "ellipse", "line", "polygon", "text"] {
            catalog.register(kind, ShapeFactory::default());
        }
        for kind in ["chart", "formula", "ole"] {
            catalog.register(
                kind,
                ShapeFactory {
                    embeds_object: true,
                    default_style: BTreeMap::new(),
                },
            );
        }
        catalog
    }

    pub fn register(&mut self, shape_kind: impl Into<String>, factory: ShapeFactory) {
        self.factories.insert(shape_kind.into(), factory);
    }

    pub fn contains(&self, shape_kind: &str) -> bool {
        self.factories.contains_key(shape_kind)
    }

    /// Rebuilds a shape payload from its stored attributes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownShape` if no factory is registered for the kind, or a
    /// consistency error if an embedded-object shape lacks its reference.
    pub fn reconstruct(&self, record: ShapeRecord) -> Result<ShapePayload> {
        let factory = self
            .factories
            .get(&record.shape_kind)
            .ok_or_else(|| GraphError::UnknownShape(record.shape_kind.clone()))?;
        if factory.embeds_object && record.object.is_none() {
            return Err(GraphError::Consistency(format!(
                "shape `{}` of kind `{}` has no embedded object reference",
                record.name, record.shape_kind
            )));
        }

        let mut style = factory.default_style.clone();
        style.extend(record.style);
        Ok(ShapePayload {
            name: record.name,
            shape_kind: record.shape_kind,
            geometry: record.geometry,
            style,
            object: record.object,
        })
    }
}

/// Explicit context handed to each `RevisionGraph`.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub config: GraphConfig,
    pub shapes: ShapeCatalog,
}

impl Environment {
    pub fn new(config: GraphConfig, shapes: ShapeCatalog) -> Self {
        Self { config, shapes }
    }

    /// Default configuration with the built-in shape catalog.
    pub fn with_builtins() -> Self {
        Self::new(GraphConfig::default(), ShapeCatalog::with_builtins())
    }
}
