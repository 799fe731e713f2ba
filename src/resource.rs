//! The typed web-resource data model (spec §3).

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The type tag of a stored web resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Html,
    Xml,
    Xsd,
    Xslt,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Html,
        ResourceKind::Xml,
        ResourceKind::Xsd,
        ResourceKind::Xslt,
    ];

    /// The form field / table / path name this kind is addressed by.
    pub const fn name(self) -> &'static str {
        match self {
            ResourceKind::Html => "html",
            ResourceKind::Xml => "xml",
            ResourceKind::Xsd => "xsd",
            ResourceKind::Xslt => "xslt",
        }
    }

    /// The MIME type served for a raw GET of this kind.
    pub const fn mime_type(self) -> &'static str {
        match self {
            ResourceKind::Html => "text/html",
            ResourceKind::Xml => "application/xml",
            ResourceKind::Xsd => "application/xml",
            ResourceKind::Xslt => "application/xslt+xml",
        }
    }

    pub fn from_name(name: &str) -> Option<ResourceKind> {
        ResourceKind::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable stored web resource.
///
/// Equality and hashing are defined by `kind` + `content` only (spec §3) —
/// two resources with different UUIDs (or, for XSLT, different `xsd`
/// links) are still equal if their type and textual content match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResource {
    pub kind: ResourceKind,
    pub uuid: Uuid,
    pub content: String,
    /// Only meaningful (and always `Some`) for `ResourceKind::Xslt`: the
    /// UUID of the XSD this stylesheet declares itself validated against.
    pub xsd: Option<Uuid>,
}

impl WebResource {
    pub fn new(kind: ResourceKind, uuid: Uuid, content: String, xsd: Option<Uuid>) -> Self {
        Self {
            kind,
            uuid,
            content,
            xsd,
        }
    }
}

impl PartialEq for WebResource {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.content == other.content
    }
}
impl Eq for WebResource {}

impl std::hash::Hash for WebResource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.content.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_uuid() {
        let a = WebResource::new(ResourceKind::Html, Uuid::new_v4(), "<p>A</p>".into(), None);
        let b = WebResource::new(ResourceKind::Html, Uuid::new_v4(), "<p>A</p>".into(), None);
        assert_eq!(a, b);
    }

    #[test]
    fn equality_requires_same_kind() {
        let a = WebResource::new(ResourceKind::Html, Uuid::new_v4(), "x".into(), None);
        let b = WebResource::new(ResourceKind::Xml, Uuid::new_v4(), "x".into(), None);
        assert_ne!(a, b);
    }

    #[test]
    fn kind_round_trips_through_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ResourceKind::from_name("bogus"), None);
    }
}
