//! Style, theme, field and document property commands
//!
//! Style edits are cycle-checked by the registry when the op is applied, so
//! a rejected edit never reaches the history.

use crate::{Command, EditError, EditTransaction, Result};
use doc_model::{
    DocModelError, DocumentMetadata, Field, FieldKind, NodeData, NodeKind, Property,
    PropertyValue, Style, StyleId, Theme, TreeEditor, TreeOp,
};

fn current_style(tx: &EditTransaction<'_>, id: &StyleId) -> Result<Style> {
    tx.tree()
        .styles()
        .get(id)
        .cloned()
        .ok_or_else(|| DocModelError::StyleNotFound(id.clone()).into())
}

/// Add a style or replace the one with the same id
#[derive(Debug, Clone)]
pub struct PutStyle {
    pub style: Style,
}

impl PutStyle {
    pub fn new(style: Style) -> Self {
        Self { style }
    }
}

impl Command for PutStyle {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let old = tx.tree().styles().get(&self.style.id).cloned();
        tx.apply(TreeOp::PutStyle {
            id: self.style.id.clone(),
            old,
            new: Some(self.style.clone()),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Modify Style"
    }
}

/// Remove a style nothing refers to
#[derive(Debug, Clone)]
pub struct RemoveStyle {
    pub id: StyleId,
}

impl Command for RemoveStyle {
    type Output = Style;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Style> {
        let old = current_style(tx, &self.id)?;
        if tx.tree().styles().default_paragraph_style() == Some(&self.id) {
            return Err(EditError::InvalidCommand(format!(
                "'{}' is the default paragraph style",
                self.id
            )));
        }
        tx.apply(TreeOp::PutStyle {
            id: self.id.clone(),
            old: Some(old.clone()),
            new: None,
        })?;
        Ok(old)
    }

    fn display_name(&self) -> &str {
        "Delete Style"
    }
}

/// Change which style a style inherits from
#[derive(Debug, Clone)]
pub struct SetBasedOn {
    pub id: StyleId,
    pub based_on: Option<StyleId>,
}

impl Command for SetBasedOn {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let old = current_style(tx, &self.id)?;
        tx.tree()
            .styles()
            .check_based_on(&self.id, self.based_on.as_ref())?;
        let new = Style {
            based_on: self.based_on.clone(),
            ..old.clone()
        };
        tx.apply(TreeOp::PutStyle {
            id: self.id.clone(),
            old: Some(old),
            new: Some(new),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Modify Style"
    }
}

/// Set or clear one property of a style
#[derive(Debug, Clone)]
pub struct SetStyleProperty {
    pub id: StyleId,
    pub property: Property,
    pub value: Option<PropertyValue>,
}

impl Command for SetStyleProperty {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let old = current_style(tx, &self.id)?;
        if let Some(value) = &self.value {
            if !self.property.accepts(value) {
                return Err(DocModelError::structural(format!(
                    "value {value:?} is not valid for {}",
                    self.property
                ))
                .into());
            }
        }
        let mut new = old.clone();
        new.properties.set(self.property, self.value.clone());
        tx.apply(TreeOp::PutStyle {
            id: self.id.clone(),
            old: Some(old),
            new: Some(new),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Modify Style"
    }
}

/// Replace the document theme
#[derive(Debug, Clone)]
pub struct SetTheme {
    pub theme: Theme,
}

impl Command for SetTheme {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let old = tx.tree().theme().clone();
        tx.apply(TreeOp::SetTheme {
            old,
            new: self.theme.clone(),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Change Theme"
    }
}

/// Replace the document properties
#[derive(Debug, Clone)]
pub struct SetMetadata {
    pub metadata: DocumentMetadata,
}

impl Command for SetMetadata {
    type Output = ();

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<()> {
        let old = tx.tree().metadata().clone();
        tx.apply(TreeOp::SetMetadata {
            old,
            new: self.metadata.clone(),
        })?;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "Document Properties"
    }
}

/// Update the cached result of every `REF` field from its bookmark.
/// Broken references keep their last result. Returns the number of fields
/// that changed.
#[derive(Debug, Clone, Default)]
pub struct RefreshReferences;

impl Command for RefreshReferences {
    type Output = usize;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<usize> {
        let mut updates = Vec::new();
        for id in tx.tree().nodes_of_kind(NodeKind::FieldReference) {
            let Some(NodeData::FieldReference(field)) = tx.tree().get(id).map(|n| n.data()) else {
                continue;
            };
            let FieldKind::Ref(bookmark) = &field.kind else {
                continue;
            };
            let Some(text) = tx.tree().reference_text(bookmark) else {
                continue;
            };
            if text != field.result {
                let new = NodeData::FieldReference(Field {
                    kind: field.kind.clone(),
                    result: text,
                });
                updates.push((id, NodeData::FieldReference(field.clone()), new));
            }
        }
        let count = updates.len();
        for (node, old, new) in updates {
            tx.apply(TreeOp::ReplaceData { node, old, new })?;
        }
        Ok(count)
    }

    fn display_name(&self) -> &str {
        "Update Fields"
    }
}
