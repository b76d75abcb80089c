//! Tracked change records

use chrono::{DateTime, Utc};
use doc_model::{NodeId, Property, PropertyValue};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracked change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(Uuid);

impl ChangeId {
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

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ChangeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A slot in a parent's child list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePosition {
    pub parent: NodeId,
    pub index: usize,
}

/// What a tracked change did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Nodes added while tracking. They are live in the tree.
    Insertion { nodes: Vec<NodeId> },
    /// Nodes marked for removal. They stay attached until the change is
    /// accepted.
    Deletion { nodes: Vec<NodeId> },
    /// A direct formatting edit. `old` is the value before tracking touched it.
    FormatChange {
        node: NodeId,
        property: Property,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
    /// A relocation. The node already sits at `to`.
    Move {
        node: NodeId,
        from: NodePosition,
        to: NodePosition,
    },
}

impl ChangeKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ChangeKind::Insertion { .. } => "Inserted",
            ChangeKind::Deletion { .. } => "Deleted",
            ChangeKind::FormatChange { .. } => "Formatted",
            ChangeKind::Move { .. } => "Moved",
        }
    }

    /// Every node the change refers to
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            ChangeKind::Insertion { nodes } | ChangeKind::Deletion { nodes } => nodes.clone(),
            ChangeKind::FormatChange { node, .. } => vec![*node],
            ChangeKind::Move { node, from, to } => vec![*node, from.parent, to.parent],
        }
    }

    /// Node used to place the change in reading order
    pub fn primary_node(&self) -> Option<NodeId> {
        match self {
            ChangeKind::Insertion { nodes } | ChangeKind::Deletion { nodes } => {
                nodes.first().copied()
            }
            ChangeKind::FormatChange { node, .. } | ChangeKind::Move { node, .. } => Some(*node),
        }
    }
}

/// Review state of a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChangeStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// One tracked change.
///
/// Records held by the overlay are always pending; accepting or rejecting one
/// removes it and hands it back with its final status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedChange {
    pub id: ChangeId,
    pub kind: ChangeKind,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: ChangeStatus,
}

impl TrackedChange {
    pub fn new(author: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            id: ChangeId::new(),
            kind,
            author: author.into(),
            timestamp: Utc::now(),
            status: ChangeStatus::Pending,
        }
    }

    pub fn insertion(author: impl Into<String>, nodes: Vec<NodeId>) -> Self {
        Self::new(author, ChangeKind::Insertion { nodes })
    }

    pub fn deletion(author: impl Into<String>, nodes: Vec<NodeId>) -> Self {
        Self::new(author, ChangeKind::Deletion { nodes })
    }

    pub fn format_change(
        author: impl Into<String>,
        node: NodeId,
        property: Property,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    ) -> Self {
        Self::new(
            author,
            ChangeKind::FormatChange {
                node,
                property,
                old,
                new,
            },
        )
    }

    pub fn move_node(author: impl Into<String>, node: NodeId, from: NodePosition, to: NodePosition) -> Self {
        Self::new(author, ChangeKind::Move { node, from, to })
    }

    /// Set a specific timestamp (importers keep the recorded date)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == ChangeStatus::Pending
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.kind.nodes()
    }

    /// Whether the change covers `node` directly
    pub fn covers(&self, node: NodeId) -> bool {
        match &self.kind {
            ChangeKind::Insertion { nodes } | ChangeKind::Deletion { nodes } => nodes.contains(&node),
            ChangeKind::FormatChange { node: n, .. } | ChangeKind::Move { node: n, .. } => *n == node,
        }
    }

    pub fn is_insertion(&self) -> bool {
        matches!(self.kind, ChangeKind::Insertion { .. })
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self.kind, ChangeKind::Deletion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_creation() {
        let node = NodeId::new();
        let change = TrackedChange::deletion("alice", vec![node]);
        assert_eq!(change.author, "alice");
        assert!(change.is_pending());
        assert!(change.is_deletion());
        assert!(change.covers(node));
        assert!(!change.covers(NodeId::new()));
        assert_eq!(change.kind.display_name(), "Deleted");
    }

    #[test]
    fn test_move_refers_to_both_parents() {
        let (node, a, b) = (NodeId::new(), NodeId::new(), NodeId::new());
        let change = TrackedChange::move_node(
            "bob",
            node,
            NodePosition { parent: a, index: 0 },
            NodePosition { parent: b, index: 2 },
        );
        assert_eq!(change.nodes(), vec![node, a, b]);
        assert_eq!(change.kind.primary_node(), Some(node));
    }

    #[test]
    fn test_change_json_shape() {
        let change = TrackedChange::format_change(
            "carol",
            NodeId::new(),
            Property::Bold,
            None,
            Some(PropertyValue::Bool(true)),
        );
        let json = serde_json::to_string(&change).unwrap();
        let back: TrackedChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);
    }
}
