//! Namespace-aware XML element tree.
//!
//! The canonical form drops the XML declaration, comments, processing
//! instructions and surrounding whitespace of text, and keeps attribute
//! order. Parsing the canonical form yields an equal tree.
//!
//! Text is not kept as separate nodes: all character data directly inside an
//! element is concatenated into [`Element::text`] and written before the
//! children. Mixed content such as `<a>x<b/>y</a>` is therefore normalized
//! to `<a>xy<b/></a>` on the first pass, and is stable from then on.

use crate::ns;
use mdindex_common::{Error, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// An XML element with its resolved namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written, e.g. `md:EntityDescriptor`
    pub name: String,
    /// Namespace URI the prefix resolved to
    pub namespace: Option<String>,
    /// Attributes in document order, including `xmlns` declarations
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Trimmed character data directly inside this element, concatenated
    /// across any interleaved children
    pub text: String,
}

impl Element {
    /// Parse a complete XML document and return its root element
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| malformed(&reader, e))?;
            match event {
                Event::Start(start) => {
                    let element = Self::open(&start, &stack)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = Self::open(&start, &stack)?;
                    attach(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| Error::malformed("unbalanced end tag"))?;
                    attach(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| malformed(&reader, e))?;
                    push_text(&mut stack, &text)?;
                }
                Event::CData(cdata) => {
                    let text = String::from_utf8(cdata.into_inner().into_owned())
                        .map_err(|e| Error::malformed(e.to_string()))?;
                    push_text(&mut stack, text.trim())?;
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions, doctypes
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::malformed("unexpected end of document"));
        }
        root.ok_or_else(|| Error::malformed("document has no root element"))
    }

    fn open(start: &BytesStart<'_>, ancestors: &[Self]) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| Error::malformed(e.to_string()))?
            .to_string();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::malformed(e.to_string()))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| Error::malformed(e.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::malformed(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        let mut element = Self {
            name,
            namespace: None,
            attributes,
            children: Vec::new(),
            text: String::new(),
        };
        let prefix = element.prefix().unwrap_or("");
        element.namespace = std::iter::once(&element)
            .chain(ancestors.iter().rev())
            .find_map(|e| e.declared_namespace(prefix))
            .map(str::to_string)
            .or_else(|| (prefix == "xml").then(|| ns::XML.to_string()));
        Ok(element)
    }

    /// Prefix of the qualified name, if any
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Name without its prefix
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Clark notation `{namespace}local`
    #[must_use]
    pub fn expanded_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.local_name()),
            None => self.local_name().to_string(),
        }
    }

    /// True if this element is `{namespace}local`
    #[must_use]
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name() == local
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Namespace declarations made on this element, as `(prefix, uri)`;
    /// the default namespace has an empty prefix
    pub fn declared_namespaces(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some(("", v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|prefix| (prefix, v.as_str()))
            }
        })
    }

    fn declared_namespace(&self, prefix: &str) -> Option<&str> {
        self.declared_namespaces()
            .find(|(p, _)| *p == prefix)
            .map(|(_, uri)| uri)
    }

    /// First descendant `{namespace}local` in document order
    #[must_use]
    pub fn find(&self, namespace: &str, local: &str) -> Option<&Self> {
        self.children.iter().find_map(|child| {
            if child.is(namespace, local) {
                Some(child)
            } else {
                child.find(namespace, local)
            }
        })
    }

    /// All descendants `{namespace}local` in document order
    #[must_use]
    pub fn find_all(&self, namespace: &str, local: &str) -> Vec<&Self> {
        let mut found = Vec::new();
        self.collect(namespace, local, &mut found);
        found
    }

    fn collect<'a>(&'a self, namespace: &str, local: &str, found: &mut Vec<&'a Self>) {
        for child in &self.children {
            if child.is(namespace, local) {
                found.push(child);
            }
            child.collect(namespace, local, found);
        }
    }

    /// Like [`Self::find_all`], but each match is cloned together with the
    /// namespace declarations it inherits, so it serializes standalone.
    #[must_use]
    pub fn detach_all(&self, namespace: &str, local: &str) -> Vec<Self> {
        let mut scope = Vec::new();
        let mut found = Vec::new();
        self.collect_detached(namespace, local, &mut scope, &mut found);
        found
    }

    fn collect_detached(
        &self,
        namespace: &str,
        local: &str,
        scope: &mut Vec<(String, String)>,
        found: &mut Vec<Self>,
    ) {
        let mark = scope.len();
        scope.extend(
            self.declared_namespaces()
                .map(|(p, uri)| (p.to_string(), uri.to_string())),
        );
        for child in &self.children {
            if child.is(namespace, local) {
                found.push(child.with_inherited_namespaces(scope));
            }
            child.collect_detached(namespace, local, scope, found);
        }
        scope.truncate(mark);
    }

    fn with_inherited_namespaces(&self, scope: &[(String, String)]) -> Self {
        let mut inherited: Vec<(String, String)> = Vec::new();
        for (prefix, uri) in scope {
            if self.declared_namespace(prefix).is_some() {
                continue;
            }
            let attr = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            match inherited.iter_mut().find(|(k, _)| *k == attr) {
                Some(existing) => existing.1.clone_from(uri),
                None => inherited.push((attr, uri.clone())),
            }
        }
        let mut detached = self.clone();
        inherited.append(&mut detached.attributes);
        detached.attributes = inherited;
        detached
    }

    /// Canonical serialization
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() && self.text.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| Error::Serialization(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if !self.text.is_empty() {
            writer
                .write_event(Event::Text(BytesText::new(&self.text)))
                .map_err(|e| Error::Serialization(e.to_string()))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

fn attach(element: Element, stack: &mut [Element], root: &mut Option<Element>) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::malformed("multiple root elements")),
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let current = stack
        .last_mut()
        .ok_or_else(|| Error::malformed("text outside the root element"))?;
    current.text.push_str(text);
    Ok(())
}

fn malformed(reader: &Reader<&[u8]>, e: impl std::fmt::Display) -> Error {
    Error::malformed(format!("at byte {}: {e}", reader.buffer_position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<!-- federation -->
<md:EntitiesDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" Name="fed">
  <md:EntityDescriptor entityID="https://idp.example.org/idp">
    <md:Organization>
      <md:OrganizationName xml:lang="en">Example &amp; Co</md:OrganizationName>
    </md:Organization>
  </md:EntityDescriptor>
</md:EntitiesDescriptor>"#;

    #[test]
    fn test_parse_resolves_namespaces() {
        let root = Element::parse(DOC.as_bytes()).unwrap();
        assert!(root.is(ns::MD, "EntitiesDescriptor"));
        assert_eq!(root.attribute("Name"), Some("fed"));
        assert_eq!(
            root.expanded_name(),
            format!("{{{}}}EntitiesDescriptor", ns::MD)
        );
        let name = root.find(ns::MD, "OrganizationName").unwrap();
        assert_eq!(name.text, "Example & Co");
        assert_eq!(name.attribute("xml:lang"), Some("en"));
    }

    #[test]
    fn test_canonical_round_trip() {
        let root = Element::parse(DOC.as_bytes()).unwrap();
        let bytes = root.to_bytes().unwrap();
        let reparsed = Element::parse(&bytes).unwrap();
        assert_eq!(root, reparsed);
        assert_eq!(bytes, reparsed.to_bytes().unwrap());
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("<md:EntitiesDescriptor"));
        assert!(text.contains("Example &amp; Co"));
        assert!(!text.contains("federation"));
    }

    #[test]
    fn test_mixed_content_text_is_concatenated() {
        let root = Element::parse(b"<a>x <b/> y<c/>z</a>").unwrap();
        assert_eq!(root.text, "xyz");
        assert_eq!(root.children.len(), 2);

        let bytes = root.to_bytes().unwrap();
        assert_eq!(bytes, b"<a>xyz<b/><c/></a>");
        let reparsed = Element::parse(&bytes).unwrap();
        assert_eq!(root, reparsed);
        assert_eq!(bytes, reparsed.to_bytes().unwrap());
    }

    #[test]
    fn test_detach_carries_namespace_declarations() {
        let root = Element::parse(DOC.as_bytes()).unwrap();
        let entities = root.detach_all(ns::MD, "EntityDescriptor");
        assert_eq!(entities.len(), 1);
        let entity = &entities[0];
        assert_eq!(entity.attributes[0], ("xmlns:md".to_string(), ns::MD.to_string()));
        let standalone = Element::parse(&entity.to_bytes().unwrap()).unwrap();
        assert!(standalone.is(ns::MD, "EntityDescriptor"));
        assert_eq!(&standalone, entity);
    }

    #[test]
    fn test_default_namespace() {
        let xml = r#"<EntityDescriptor xmlns="urn:oasis:names:tc:SAML:2.0:metadata" entityID="x"><IDPSSODescriptor/></EntityDescriptor>"#;
        let root = Element::parse(xml.as_bytes()).unwrap();
        assert!(root.is(ns::MD, "EntityDescriptor"));
        assert!(root.find(ns::MD, "IDPSSODescriptor").is_some());
    }

    #[test]
    fn test_malformed_documents() {
        assert!(Element::parse(b"").is_err());
        assert!(Element::parse(b"<a><b></a>").is_err());
        assert!(Element::parse(b"<a/><b/>").is_err());
        assert!(Element::parse(b"<a>").is_err());
    }
}
