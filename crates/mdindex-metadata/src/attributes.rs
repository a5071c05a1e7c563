//! Categorical attribute extraction.
//!
//! An entity's indexable attributes come from a closed set of rules; each
//! rule contributes `name -> values` pairs.

use crate::element::Element;
use crate::ns;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Attribute name under which IdP/SP roles are indexed
pub const ROLE_ATTRIBUTE: &str = "role";

/// Attribute name to the set of values seen for it
pub type CategoricalAttributes = BTreeMap<String, BTreeSet<String>>;

/// Recognized extraction rules
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionRule {
    /// `mdattr:EntityAttributes/saml:Attribute[@Name]/saml:AttributeValue`
    EntityAttributes,
    /// `role` = `idp` and/or `sp` from the SSO descriptors present
    Roles,
}

impl ExtractionRule {
    pub const ALL: [Self; 2] = [Self::EntityAttributes, Self::Roles];

    fn apply(self, entity: &Element, out: &mut CategoricalAttributes) {
        match self {
            Self::EntityAttributes => {
                for block in entity.find_all(ns::MDATTR, "EntityAttributes") {
                    for attribute in block.find_all(ns::SAML, "Attribute") {
                        let Some(name) = attribute.attribute("Name") else {
                            debug!("Skipping saml:Attribute without Name");
                            continue;
                        };
                        let values: BTreeSet<String> = attribute
                            .find_all(ns::SAML, "AttributeValue")
                            .into_iter()
                            .map(|v| v.text.trim().to_string())
                            .filter(|v| !v.is_empty())
                            .collect();
                        if !values.is_empty() {
                            out.entry(name.to_string()).or_default().extend(values);
                        }
                    }
                }
            }
            Self::Roles => {
                let mut roles = BTreeSet::new();
                if is_idp(entity) {
                    roles.insert("idp".to_string());
                }
                if is_sp(entity) {
                    roles.insert("sp".to_string());
                }
                if !roles.is_empty() {
                    out.entry(ROLE_ATTRIBUTE.to_string())
                        .or_default()
                        .extend(roles);
                }
            }
        }
    }
}

/// Apply every extraction rule to an entity element
#[must_use]
pub fn categorical_attributes(entity: &Element) -> CategoricalAttributes {
    let mut out = CategoricalAttributes::new();
    for rule in ExtractionRule::ALL {
        rule.apply(entity, &mut out);
    }
    out
}

#[must_use]
pub fn is_idp(entity: &Element) -> bool {
    entity.find(ns::MD, "IDPSSODescriptor").is_some()
}

#[must_use]
pub fn is_sp(entity: &Element) -> bool {
    entity.find(ns::MD, "SPSSODescriptor").is_some()
}
