//! Comments - annotations and discussions on document content
//!
//! A comment is anchored either to a text range or to a whole node. Anchors
//! are re-pointed rather than dropped when the content under them goes away:
//! the comment is flagged as orphaned, keeps its former anchor, and attaches
//! to the nearest surviving ancestor.

use chrono::{DateTime, Utc};
use doc_model::{NodeId, TextPoint, TextRange};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;
use uuid::Uuid;

/// Unique identifier for a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(Uuid);

impl CommentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for CommentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CommentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a comment reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplyId(Uuid);

impl ReplyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ReplyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReplyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a comment is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentAnchor {
    /// A span of text between two points in runs
    Text { start: TextPoint, end: TextPoint },
    /// A whole node (a paragraph, table, image, ...)
    Node(NodeId),
}

impl CommentAnchor {
    pub fn range(range: TextRange) -> Self {
        CommentAnchor::Text {
            start: range.start,
            end: range.end,
        }
    }

    pub fn node(id: NodeId) -> Self {
        CommentAnchor::Node(id)
    }

    /// Nodes the anchor points into
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            CommentAnchor::Text { start, end } if start.node == end.node => vec![start.node],
            CommentAnchor::Text { start, end } => vec![start.node, end.node],
            CommentAnchor::Node(id) => vec![*id],
        }
    }

    /// Whether the anchor touches `node` directly
    pub fn touches(&self, node: NodeId) -> bool {
        self.nodes().contains(&node)
    }

    pub fn is_point(&self) -> bool {
        matches!(self, CommentAnchor::Text { start, end } if start == end)
    }

    /// Shift points after `inserted` graphemes replaced `removed` graphemes at
    /// `offset` of `node`. Points inside the removed span move to its start.
    /// Returns true if anything moved.
    pub fn adjust_for_edit(&mut self, node: NodeId, offset: usize, removed: usize, inserted: usize) -> bool {
        let CommentAnchor::Text { start, end } = self else {
            return false;
        };
        let before = (*start, *end);
        for point in [start, end] {
            if point.node != node || point.offset < offset {
                continue;
            }
            if point.offset >= offset + removed {
                point.offset = point.offset - removed + inserted;
            } else {
                point.offset = offset;
            }
        }
        let CommentAnchor::Text { start, end } = self else {
            return false;
        };
        (*start, *end) != before
    }

    /// Move points that sit past `offset` of `run` into its new right half.
    /// Returns true if anything moved.
    pub fn follow_split(&mut self, run: NodeId, offset: usize, right: NodeId) -> bool {
        let CommentAnchor::Text { start, end } = self else {
            return false;
        };
        let mut moved = false;
        // A start on the boundary belongs to the right half, an end on it to
        // the left.
        if start.node == run && start.offset >= offset {
            *start = TextPoint::new(right, start.offset - offset);
            moved = true;
        }
        if end.node == run && end.offset > offset {
            *end = TextPoint::new(right, end.offset - offset);
            moved = true;
        }
        moved
    }
}

/// Set when a comment lost the content it was attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orphaned {
    /// Anchor before the content was removed
    pub former: CommentAnchor,
    pub at: DateTime<Utc>,
}

/// A reply in a comment thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentReply {
    pub id: ReplyId,
    pub author: String,
    pub created: DateTime<Utc>,
    pub body: String,
    #[serde(default)]
    pub edited: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: bool,
}

impl CommentReply {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: ReplyId::new(),
            author: author.into(),
            created: Utc::now(),
            body: body.into(),
            edited: None,
            resolved: false,
        }
    }

    pub fn mentions(&self) -> Vec<String> {
        extract_mentions(&self.body)
    }
}

/// A comment with its thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub anchor: CommentAnchor,
    pub author: String,
    pub created: DateTime<Utc>,
    pub body: String,
    #[serde(default)]
    pub edited: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replies: Vec<CommentReply>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub orphaned: Option<Orphaned>,
}

impl Comment {
    pub fn new(anchor: CommentAnchor, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: CommentId::new(),
            anchor,
            author: author.into(),
            created: Utc::now(),
            body: body.into(),
            edited: None,
            replies: Vec::new(),
            resolved: false,
            resolved_by: None,
            resolved_at: None,
            tags: BTreeSet::new(),
            orphaned: None,
        }
    }

    /// Set the creation date (importers keep the recorded date)
    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn is_orphaned(&self) -> bool {
        self.orphaned.is_some()
    }

    /// Replace the body and stamp the edit time
    pub fn edit(&mut self, body: impl Into<String>) {
        self.body = body.into();
        self.edited = Some(Utc::now());
    }

    pub fn add_reply(&mut self, reply: CommentReply) {
        self.replies.push(reply);
    }

    pub fn reply(&self, id: ReplyId) -> Option<&CommentReply> {
        self.replies.iter().find(|r| r.id == id)
    }

    pub fn reply_mut(&mut self, id: ReplyId) -> Option<&mut CommentReply> {
        self.replies.iter_mut().find(|r| r.id == id)
    }

    pub fn remove_reply(&mut self, id: ReplyId) -> Option<CommentReply> {
        let pos = self.replies.iter().position(|r| r.id == id)?;
        Some(self.replies.remove(pos))
    }

    /// Resolve the thread. Replies are resolved with it.
    pub fn resolve(&mut self, by: impl Into<String>) {
        self.resolved = true;
        self.resolved_by = Some(by.into());
        self.resolved_at = Some(Utc::now());
        for reply in &mut self.replies {
            reply.resolved = true;
        }
    }

    pub fn reopen(&mut self) {
        self.resolved = false;
        self.resolved_by = None;
        self.resolved_at = None;
        for reply in &mut self.replies {
            reply.resolved = false;
        }
    }

    /// Returns false if the tag was already present
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    /// `@mentions` in the body and every reply, deduplicated, in order of
    /// first appearance
    pub fn mentions(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let bodies = std::iter::once(self.body.as_str()).chain(self.replies.iter().map(|r| r.body.as_str()));
        for body in bodies {
            for mention in extract_mentions(body) {
                if !seen.contains(&mention) {
                    seen.push(mention);
                }
            }
        }
        seen
    }

    pub fn mentions_user(&self, user: &str) -> bool {
        self.mentions().iter().any(|m| m.eq_ignore_ascii_case(user))
    }

    /// Authors of the comment and its replies
    pub fn participants(&self) -> BTreeSet<&str> {
        std::iter::once(self.author.as_str())
            .chain(self.replies.iter().map(|r| r.author.as_str()))
            .collect()
    }
}

fn mention_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:^|[^\w@])@([A-Za-z0-9_][A-Za-z0-9_.\-]*)").ok())
        .as_ref()
}

/// Extract `@name` mentions from comment text
pub fn extract_mentions(body: &str) -> Vec<String> {
    let Some(pattern) = mention_pattern() else {
        return Vec::new();
    };
    pattern
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', '-']).to_string())
        .filter(|m| !m.is_empty())
        .collect()
}

/// Reported when a comment had to be re-anchored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedAnnotation {
    pub comment: CommentId,
    pub former: CommentAnchor,
    pub reanchored_to: NodeId,
}
