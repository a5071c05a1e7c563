//! XML namespaces used by SAML metadata

/// SAML 2.0 metadata
pub const MD: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
/// Metadata extension for entity attributes
pub const MDATTR: &str = "urn:oasis:names:tc:SAML:metadata:attribute";
/// SAML 2.0 assertion
pub const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
/// Implicitly bound `xml:` prefix
pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
