//! Relationship and content type parts
//!
//! Every part other than the root is found through a `.rels` file next to
//! its source part, and every part needs a content type in
//! `[Content_Types].xml`.

use super::namespaces;
use crate::xml::{self, XmlWriter};
use crate::{CodecError, CodecResult, Format};

/// A single relationship in a .rels file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Unique ID within the rels file (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target path, relative to the source part's folder
    pub target: String,
    pub external: bool,
}

/// Relationships of one source part
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    items: Vec<Relationship>,
    next_id: u32,
}

impl Relationships {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
        }
    }

    /// Parse a .rels part
    pub fn parse(content: &str) -> CodecResult<Self> {
        let root = xml::parse(content, Format::Docx)?;
        let mut rels = Self::new();
        for el in root.children_named("Relationship") {
            let (Some(id), Some(rel_type), Some(target)) =
                (el.attr("Id"), el.attr("Type"), el.attr("Target"))
            else {
                return Err(CodecError::malformed(
                    Format::Docx,
                    "relationship without Id, Type or Target",
                ));
            };
            if let Some(n) = id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()) {
                rels.next_id = rels.next_id.max(n + 1);
            }
            rels.items.push(Relationship {
                id: id.to_string(),
                rel_type: rel_type.to_string(),
                target: target.to_string(),
                external: el.attr("TargetMode") == Some("External"),
            });
        }
        Ok(rels)
    }

    /// Add a relationship and return its generated id
    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        let id = format!("rId{}", self.next_id);
        self.next_id += 1;
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external: false,
        });
        id
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|r| r.id == id)
    }

    /// First internal relationship of a type
    pub fn by_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.items
            .iter()
            .find(|r| r.rel_type == rel_type && !r.external)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new(false);
        w.open("Relationships", &[("xmlns", namespaces::PKG_REL)]);
        for rel in &self.items {
            let mut attrs = vec![
                ("Id", rel.id.as_str()),
                ("Type", rel.rel_type.as_str()),
                ("Target", rel.target.as_str()),
            ];
            if rel.external {
                attrs.push(("TargetMode", "External"));
            }
            w.empty("Relationship", &attrs);
        }
        w.close();
        w.finish()
    }
}

/// Path of the .rels part that belongs to `part`
pub fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target against the folder of its source part
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// `[Content_Types].xml` builder
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    defaults: Vec<(String, String)>,
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    /// Defaults every package needs
    pub fn new() -> Self {
        let mut types = Self::default();
        types.add_default("rels", super::content_type_values::RELATIONSHIPS);
        types.add_default("xml", super::content_type_values::XML);
        types
    }

    pub fn add_default(&mut self, extension: &str, content_type: &str) {
        if !self.defaults.iter().any(|(e, _)| e == extension) {
            self.defaults
                .push((extension.to_string(), content_type.to_string()));
        }
    }

    /// Content type of one part; `part` is the path inside the package
    pub fn add_override(&mut self, part: &str, content_type: &str) {
        let name = format!("/{}", part.trim_start_matches('/'));
        if !self.overrides.iter().any(|(p, _)| *p == name) {
            self.overrides.push((name, content_type.to_string()));
        }
    }

    pub fn to_xml(&self) -> String {
        let mut w = XmlWriter::new(false);
        w.open("Types", &[("xmlns", namespaces::CT)]);
        for (extension, content_type) in &self.defaults {
            w.empty(
                "Default",
                &[("Extension", extension.as_str()), ("ContentType", content_type.as_str())],
            );
        }
        for (part, content_type) in &self.overrides {
            w.empty(
                "Override",
                &[("PartName", part.as_str()), ("ContentType", content_type.as_str())],
            );
        }
        w.close();
        w.finish()
    }
}
