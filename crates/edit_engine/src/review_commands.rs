//! Accept and reject commands for tracked changes

use crate::{Command, EditTransaction, Result};
use revisions::{accept_all, accept_change, reject_all, reject_change, ChangeId, TrackedChange};

#[derive(Debug, Clone)]
pub struct AcceptChange {
    pub change_id: ChangeId,
}

impl Command for AcceptChange {
    type Output = TrackedChange;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<TrackedChange> {
        Ok(accept_change(tx, self.change_id)?)
    }

    fn display_name(&self) -> &str {
        "Accept Change"
    }
}

#[derive(Debug, Clone)]
pub struct RejectChange {
    pub change_id: ChangeId,
}

impl Command for RejectChange {
    type Output = TrackedChange;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<TrackedChange> {
        Ok(reject_change(tx, self.change_id)?)
    }

    fn display_name(&self) -> &str {
        "Reject Change"
    }
}

#[derive(Debug, Clone, Default)]
pub struct AcceptAllChanges;

impl Command for AcceptAllChanges {
    type Output = Vec<TrackedChange>;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Vec<TrackedChange>> {
        Ok(accept_all(tx)?)
    }

    fn display_name(&self) -> &str {
        "Accept All Changes"
    }
}

#[derive(Debug, Clone, Default)]
pub struct RejectAllChanges;

impl Command for RejectAllChanges {
    type Output = Vec<TrackedChange>;

    fn apply(&self, tx: &mut EditTransaction<'_>) -> Result<Vec<TrackedChange>> {
        Ok(reject_all(tx)?)
    }

    fn display_name(&self) -> &str {
        "Reject All Changes"
    }
}
