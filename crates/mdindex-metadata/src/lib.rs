//! mdindex Metadata - SAML metadata documents
//!
//! Parses federation metadata into a namespace-aware tree, extracts the
//! identity, validity and categorical attribute fields the index needs, and
//! produces a canonical serialization.

pub mod attributes;
pub mod document;
pub mod element;
pub mod ns;
pub mod validity;

pub use attributes::{CategoricalAttributes, ROLE_ATTRIBUTE};
pub use document::{Document, DocumentKind};
pub use element::Element;
pub use validity::{CalendarDuration, parse_duration, parse_instant};
