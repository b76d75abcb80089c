//! Effective formatting
//!
//! A property is looked up through an ordered list of layers, first hit wins:
//!
//! 1. the node's direct formatting
//! 2. the node's own style chain (paragraphs without a style use the
//!    registry's default paragraph style)
//! 3. for each enclosing paragraph, cell, row and table, nearest first, its
//!    direct formatting followed by its style chain
//! 4. the theme (font family and text color only)
//! 5. document defaults, which cover every property
//!
//! Theme references in any layer are replaced with concrete values.

use crate::{
    Alignment, Color, DocumentTree, Formatting, LineSpacing, Node, NodeId, NodeKind, Property,
    PropertyScope, PropertyValue, Result, StyleId, ThemeColorSlot, ThemeFont, TreeOp,
    VerticalAlign,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Where a resolved value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertySource {
    Direct,
    /// Direct formatting of an enclosing paragraph, cell, row or table
    Inherited(NodeId),
    Style(StyleId),
    Theme,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedValue {
    pub value: PropertyValue,
    pub source: PropertySource,
}

/// Fully resolved formatting of one node. Holds a value for every property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveFormatting {
    values: BTreeMap<Property, ResolvedValue>,
}

impl EffectiveFormatting {
    pub fn get(&self, property: Property) -> &PropertyValue {
        // Every property is filled in by `resolve`; the fallback only guards
        // against hand-built instances.
        self.values
            .get(&property)
            .map(|r| &r.value)
            .unwrap_or(&PropertyValue::Transparent)
    }

    pub fn source(&self, property: Property) -> Option<&PropertySource> {
        self.values.get(&property).map(|r| &r.source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Property, &ResolvedValue)> {
        self.values.iter().map(|(p, v)| (*p, v))
    }

    /// Plain property map, sources dropped
    pub fn to_formatting(&self) -> Formatting {
        self.values
            .iter()
            .map(|(p, r)| (*p, r.value.clone()))
            .collect()
    }

    /// Values restricted to one scope
    pub fn scoped(&self, scope: PropertyScope) -> Formatting {
        self.to_formatting().scoped(scope)
    }

    fn flag(&self, property: Property) -> bool {
        self.get(property).as_bool().unwrap_or(false)
    }

    fn points(&self, property: Property) -> f32 {
        self.get(property).as_points().unwrap_or(0.0)
    }

    fn fill(&self, property: Property) -> Option<Color> {
        self.get(property).as_color()
    }

    pub fn font_family(&self) -> &str {
        self.get(Property::FontFamily).as_text().unwrap_or_default()
    }

    pub fn font_size(&self) -> f32 {
        self.points(Property::FontSize)
    }

    pub fn bold(&self) -> bool {
        self.flag(Property::Bold)
    }

    pub fn italic(&self) -> bool {
        self.flag(Property::Italic)
    }

    pub fn underline(&self) -> bool {
        self.flag(Property::Underline)
    }

    pub fn strikethrough(&self) -> bool {
        self.flag(Property::Strikethrough)
    }

    pub fn all_caps(&self) -> bool {
        self.flag(Property::AllCaps)
    }

    pub fn small_caps(&self) -> bool {
        self.flag(Property::SmallCaps)
    }

    pub fn color(&self) -> Color {
        self.get(Property::Color).as_color().unwrap_or(Color::BLACK)
    }

    /// `None` when transparent
    pub fn highlight(&self) -> Option<Color> {
        self.fill(Property::Highlight)
    }

    pub fn vertical_align(&self) -> VerticalAlign {
        match self.get(Property::VerticalAlign) {
            PropertyValue::VerticalAlign(v) => *v,
            _ => VerticalAlign::Baseline,
        }
    }

    pub fn alignment(&self) -> Alignment {
        match self.get(Property::Alignment) {
            PropertyValue::Alignment(a) => *a,
            _ => Alignment::Left,
        }
    }

    pub fn indent_left(&self) -> f32 {
        self.points(Property::IndentLeft)
    }

    pub fn indent_right(&self) -> f32 {
        self.points(Property::IndentRight)
    }

    pub fn indent_first_line(&self) -> f32 {
        self.points(Property::IndentFirstLine)
    }

    pub fn space_before(&self) -> f32 {
        self.points(Property::SpaceBefore)
    }

    pub fn space_after(&self) -> f32 {
        self.points(Property::SpaceAfter)
    }

    pub fn line_spacing(&self) -> LineSpacing {
        match self.get(Property::LineSpacing) {
            PropertyValue::LineSpacing(s) => *s,
            _ => LineSpacing::Multiple(1.0),
        }
    }

    pub fn keep_with_next(&self) -> bool {
        self.flag(Property::KeepWithNext)
    }

    pub fn keep_together(&self) -> bool {
        self.flag(Property::KeepTogether)
    }

    pub fn page_break_before(&self) -> bool {
        self.flag(Property::PageBreakBefore)
    }

    pub fn outline_level(&self) -> u8 {
        match self.get(Property::OutlineLevel) {
            PropertyValue::Level(l) => *l,
            _ => 0,
        }
    }

    /// List style reference and level, as cascaded
    pub fn list(&self) -> Option<(&StyleId, u8)> {
        let list = self.get(Property::ListStyle).as_list_ref()?;
        let level = match self.get(Property::ListLevel) {
            PropertyValue::Level(l) => *l,
            _ => 0,
        };
        Some((list, level))
    }

    pub fn cell_shading(&self) -> Option<Color> {
        self.fill(Property::CellShading)
    }

    pub fn border_width(&self) -> f32 {
        self.points(Property::BorderWidth)
    }

    pub fn cell_padding(&self) -> f32 {
        self.points(Property::CellPadding)
    }
}

/// What a cached result was computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleDeps {
    /// Every style id consulted, with its revision (`None` if it was missing)
    styles: Vec<(StyleId, Option<u64>)>,
    default_epoch: u64,
    theme_version: u64,
}

impl StyleDeps {
    fn is_current(&self, tree: &DocumentTree) -> bool {
        self.theme_version == tree.theme_version()
            && self.default_epoch == tree.styles().default_epoch()
            && self
                .styles
                .iter()
                .all(|(id, rev)| tree.styles().revision_of(id) == *rev)
    }
}

struct Layer<'a> {
    source: PropertySource,
    formatting: &'a Formatting,
}

fn push_style_chain<'t>(
    tree: &'t DocumentTree,
    node: &Node,
    layers: &mut Vec<Layer<'t>>,
    deps: &mut StyleDeps,
) {
    let styles = tree.styles();
    let style = match (node.style_ref(), node.kind()) {
        (Some(s), _) => Some(s.clone()),
        (None, NodeKind::Paragraph) => styles.default_paragraph_style().cloned(),
        _ => None,
    };
    let Some(style) = style else {
        return;
    };
    for sid in styles.chain_ids(&style) {
        if !deps.styles.iter().any(|(seen, _)| *seen == sid) {
            let rev = styles.revision_of(&sid);
            deps.styles.push((sid, rev));
        }
    }
    layers.extend(styles.chain(&style).into_iter().map(|s| Layer {
        source: PropertySource::Style(s.id.clone()),
        formatting: &s.properties,
    }));
}

fn collect_layers(tree: &DocumentTree, id: NodeId) -> Result<(Vec<Layer<'_>>, StyleDeps)> {
    let mut layers = Vec::new();
    let mut deps = StyleDeps {
        styles: Vec::new(),
        default_epoch: tree.styles().default_epoch(),
        theme_version: tree.theme_version(),
    };

    let node = tree.node(id)?;
    layers.push(Layer {
        source: PropertySource::Direct,
        formatting: node.direct_formatting(),
    });
    push_style_chain(tree, node, &mut layers, &mut deps);

    for ancestor in tree.ancestors(id) {
        let Some(a) = tree.get(ancestor) else {
            continue;
        };
        if !matches!(
            a.kind(),
            NodeKind::Paragraph | NodeKind::TableCell | NodeKind::TableRow | NodeKind::Table
        ) {
            continue;
        }
        layers.push(Layer {
            source: PropertySource::Inherited(ancestor),
            formatting: a.direct_formatting(),
        });
        push_style_chain(tree, a, &mut layers, &mut deps);
    }
    Ok((layers, deps))
}

fn resolve_with_deps(tree: &DocumentTree, id: NodeId) -> Result<(EffectiveFormatting, StyleDeps)> {
    let (layers, deps) = collect_layers(tree, id)?;
    let theme = tree.theme();
    let lookup = |property: Property| {
        layers.iter().find_map(|layer| {
            layer
                .formatting
                .get(property)
                .map(|v| (v, layer.source.clone()))
        })
    };

    let outline_level = match lookup(Property::OutlineLevel) {
        Some((PropertyValue::Level(l), _)) => *l,
        _ => match tree.defaults().get(Property::OutlineLevel) {
            PropertyValue::Level(l) => l,
            _ => 0,
        },
    };

    let mut values = BTreeMap::new();
    for property in Property::ALL {
        let resolved = match lookup(property) {
            Some((value, source)) => ResolvedValue {
                value: theme.substitute(value),
                source,
            },
            None => match property {
                Property::FontFamily => {
                    let slot = if outline_level > 0 {
                        ThemeFont::Heading
                    } else {
                        ThemeFont::Body
                    };
                    ResolvedValue {
                        value: PropertyValue::Text(theme.font(slot).to_string()),
                        source: PropertySource::Theme,
                    }
                }
                Property::Color => ResolvedValue {
                    value: PropertyValue::Color(theme.color(ThemeColorSlot::Text)),
                    source: PropertySource::Theme,
                },
                _ => ResolvedValue {
                    value: theme.substitute(&tree.defaults().get(property)),
                    source: PropertySource::Default,
                },
            },
        };
        values.insert(property, resolved);
    }
    Ok((EffectiveFormatting { values }, deps))
}

/// Resolve the effective formatting of `id` without caching.
pub fn resolve(tree: &DocumentTree, id: NodeId) -> Result<EffectiveFormatting> {
    resolve_with_deps(tree, id).map(|(formatting, _)| formatting)
}

struct CacheEntry {
    formatting: EffectiveFormatting,
    deps: StyleDeps,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Memoized [`resolve`].
///
/// Entries are checked against style revisions and the theme version on
/// every read. Edits to a node's own formatting or position must be reported
/// through [`StyleCache::observe`] before the next read.
#[derive(Default)]
pub struct StyleCache {
    entries: HashMap<NodeId, CacheEntry>,
    stats: CacheStats,
}

impl StyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, tree: &DocumentTree, id: NodeId) -> Result<EffectiveFormatting> {
        if let Some(entry) = self.entries.get(&id) {
            if entry.deps.is_current(tree) {
                self.stats.hits += 1;
                return Ok(entry.formatting.clone());
            }
        }
        self.stats.misses += 1;
        let (formatting, deps) = resolve_with_deps(tree, id)?;
        self.entries.insert(
            id,
            CacheEntry {
                formatting: formatting.clone(),
                deps,
            },
        );
        Ok(formatting)
    }

    /// Drop cached results for `root` and everything below it.
    pub fn invalidate_subtree(&mut self, tree: &DocumentTree, root: NodeId) {
        for id in tree.descendants(root) {
            if self.entries.remove(&id).is_some() {
                self.stats.evictions += 1;
            }
        }
    }

    /// Evict whatever `op` may have made stale. Call after applying it.
    pub fn observe(&mut self, tree: &DocumentTree, op: &TreeOp) {
        if let Some(root) = op.formatting_scope() {
            self.invalidate_subtree(tree, root);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Style, Theme};

    fn hello() -> (DocumentTree, NodeId, NodeId) {
        let mut tree = DocumentTree::new();
        let section = tree.append(tree.root_id(), Node::section()).unwrap();
        let para = tree.append(section, Node::paragraph()).unwrap();
        let run = tree.append(para, Node::run("Hello")).unwrap();
        (tree, para, run)
    }

    #[test]
    fn test_plain_run_uses_normal_and_theme() {
        let (tree, _, run) = hello();
        let fmt = resolve(&tree, run).unwrap();
        assert!(!fmt.bold());
        assert_eq!(fmt.font_size(), 11.0);
        assert_eq!(fmt.font_family(), "Calibri");
        assert_eq!(
            fmt.source(Property::FontSize),
            Some(&PropertySource::Style(StyleId::new("Normal")))
        );
        assert_eq!(fmt.source(Property::Bold), Some(&PropertySource::Default));
        assert_eq!(fmt.source(Property::Color), Some(&PropertySource::Theme));
    }

    #[test]
    fn test_direct_beats_style() {
        let (mut tree, para, run) = hello();
        tree.set_style_ref(para, Some(StyleId::new("Heading1"))).unwrap();
        assert!(resolve(&tree, run).unwrap().bold());
        tree.set_direct_formatting(run, Property::Bold, Some(false.into()))
            .unwrap();
        let fmt = resolve(&tree, run).unwrap();
        assert!(!fmt.bold());
        assert_eq!(fmt.source(Property::Bold), Some(&PropertySource::Direct));
    }

    #[test]
    fn test_run_style_beats_paragraph_style() {
        let (mut tree, para, run) = hello();
        tree.set_style_ref(para, Some(StyleId::new("Heading3"))).unwrap();
        tree.set_style_ref(run, Some(StyleId::new("Emphasis"))).unwrap();
        tree.put_style(Style::character("Plain", "Plain").with_property(Property::Italic, false))
            .unwrap();
        assert!(resolve(&tree, run).unwrap().italic());
        tree.set_style_ref(run, Some(StyleId::new("Plain"))).unwrap();
        assert!(!resolve(&tree, run).unwrap().italic());
    }

    #[test]
    fn test_style_chain_outranks_defaults() {
        let (mut tree, para, run) = hello();
        tree.defaults_mut().set(Property::FontSize, PropertyValue::Points(20.0));
        tree.set_style_ref(para, Some(StyleId::new("Heading2"))).unwrap();
        assert_eq!(resolve(&tree, run).unwrap().font_size(), 13.0);
    }

    #[test]
    fn test_heading_font_follows_outline_level() {
        let (mut tree, para, run) = hello();
        tree.set_style_ref(para, Some(StyleId::new("Heading1"))).unwrap();
        assert_eq!(resolve(&tree, run).unwrap().font_family(), "Calibri Light");
        tree.set_theme(Theme::sepia());
        assert_eq!(
            resolve(&tree, run).unwrap().font_family(),
            Theme::sepia().heading_font
        );
    }

    #[test]
    fn test_paragraph_properties_reach_runs() {
        let (mut tree, para, run) = hello();
        tree.set_direct_formatting(para, Property::Alignment, Some(Alignment::Right.into()))
            .unwrap();
        let fmt = resolve(&tree, run).unwrap();
        assert_eq!(fmt.alignment(), Alignment::Right);
        assert_eq!(
            fmt.source(Property::Alignment),
            Some(&PropertySource::Inherited(para))
        );
    }

    #[test]
    fn test_empty_registry_falls_back_to_theme_and_defaults() {
        let mut tree = DocumentTree::new()
            .with_styles(crate::StyleRegistry::empty())
            .unwrap();
        let section = tree.append(tree.root_id(), Node::section()).unwrap();
        let para = tree.append(section, Node::paragraph()).unwrap();
        let run = tree.append(para, Node::run("x")).unwrap();
        let fmt = resolve(&tree, run).unwrap();
        assert_eq!(fmt.font_family(), "Calibri");
        assert_eq!(fmt.source(Property::FontSize), Some(&PropertySource::Default));
    }

    #[test]
    fn test_resolve_is_pure() {
        let (tree, _, run) = hello();
        assert_eq!(resolve(&tree, run).unwrap(), resolve(&tree, run).unwrap());
    }

    #[test]
    fn test_cache_hits_until_style_changes() {
        let (mut tree, _, run) = hello();
        let mut cache = StyleCache::new();
        cache.resolve(&tree, run).unwrap();
        cache.resolve(&tree, run).unwrap();
        assert_eq!(cache.stats().hits, 1);

        tree.styles_mut()
            .set_property(&StyleId::new("Normal"), Property::FontSize, Some(PropertyValue::Points(14.0)))
            .unwrap();
        assert_eq!(cache.resolve(&tree, run).unwrap().font_size(), 14.0);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_cache_follows_theme_changes() {
        let (mut tree, _, run) = hello();
        let mut cache = StyleCache::new();
        assert_eq!(cache.resolve(&tree, run).unwrap().font_family(), "Calibri");
        tree.set_theme(Theme::sepia());
        assert_eq!(
            cache.resolve(&tree, run).unwrap().font_family(),
            Theme::sepia().body_font
        );
    }

    #[test]
    fn test_observe_evicts_subtree() {
        let (mut tree, para, run) = hello();
        let mut cache = StyleCache::new();
        assert!(!cache.resolve(&tree, run).unwrap().bold());
        let op = TreeOp::SetStyleRef {
            node: para,
            old: None,
            new: Some(StyleId::new("Heading1")),
        };
        op.apply(&mut tree).unwrap();
        cache.observe(&tree, &op);
        assert!(cache.is_empty());
        assert!(cache.resolve(&tree, run).unwrap().bold());
    }
}
