//! Metadata documents: a single entity or a named collection of entities.

use crate::attributes::{self, CategoricalAttributes};
use crate::element::Element;
use crate::ns;
use mdindex_common::{Error, Result};
use std::collections::BTreeMap;

/// Root kinds the store accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentKind {
    /// `md:EntityDescriptor`
    Entity,
    /// `md:EntitiesDescriptor`
    EntityCollection,
}

/// A parsed metadata document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Element::parse(bytes).map(Self::from_element)
    }

    #[must_use]
    pub const fn from_element(root: Element) -> Self {
        Self { root }
    }

    #[must_use]
    pub const fn root(&self) -> &Element {
        &self.root
    }

    /// Kind of the root element; anything else is rejected
    pub fn kind(&self) -> Result<DocumentKind> {
        if self.root.is(ns::MD, "EntityDescriptor") {
            Ok(DocumentKind::Entity)
        } else if self.root.is(ns::MD, "EntitiesDescriptor") {
            Ok(DocumentKind::EntityCollection)
        } else {
            Err(Error::UnsupportedDocumentKind(self.root.expanded_name()))
        }
    }

    /// `entityID` of an entity, `Name` of a collection
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self.kind().ok()? {
            DocumentKind::Entity => self.root.attribute("entityID"),
            DocumentKind::EntityCollection => self.root.attribute("Name"),
        }
    }

    /// Declared `validUntil`, unparsed
    #[must_use]
    pub fn valid_until(&self) -> Option<&str> {
        self.root.attribute("validUntil")
    }

    /// Declared `cacheDuration`, unparsed
    #[must_use]
    pub fn cache_duration(&self) -> Option<&str> {
        self.root.attribute("cacheDuration")
    }

    /// Root attributes, without namespace declarations
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, String> {
        self.root
            .attributes
            .iter()
            .filter(|(k, _)| k != "xmlns" && !k.starts_with("xmlns:"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn categorical_attributes(&self) -> CategoricalAttributes {
        attributes::categorical_attributes(&self.root)
    }

    #[must_use]
    pub fn is_idp(&self) -> bool {
        attributes::is_idp(&self.root)
    }

    #[must_use]
    pub fn is_sp(&self) -> bool {
        attributes::is_sp(&self.root)
    }

    /// Every entity below the root, at any depth, as a standalone document
    #[must_use]
    pub fn entities(&self) -> Vec<Self> {
        self.root
            .detach_all(ns::MD, "EntityDescriptor")
            .into_iter()
            .map(Self::from_element)
            .collect()
    }

    /// Canonical serialization
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.root.to_bytes()
    }
}
