//! Randomized review checks: whatever is typed or deleted while tracking,
//! the original view shows the untouched text, rejecting everything brings
//! it back, and accepting everything yields the final view.

use doc_model::{
    DocModelError, DocumentTree, Node, NodeId, NodeKind, Property, Result as ModelResult,
    TextRange, TreeEditor, TreeOp,
};
use proptest::prelude::*;
use revisions::{
    accept_all, reject_all, tracked_insert_text, tracked_remove_range, tracked_set_property,
    Overlay, OverlayEditor, OverlayOp, ViewMode,
};

struct Editor {
    tree: DocumentTree,
    overlay: Overlay,
}

impl TreeEditor for Editor {
    fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    fn create(&mut self, node: Node) -> ModelResult<NodeId> {
        self.tree.create(node)
    }

    fn apply(&mut self, op: TreeOp) -> ModelResult<()> {
        op.apply(&mut self.tree)
    }

    fn before_split(&mut self, run: NodeId, offset: usize, right: NodeId) -> ModelResult<()> {
        for op in self.overlay.plan_split(run, offset, right) {
            op.apply(&mut self.overlay)
                .map_err(|e| DocModelError::structural(e.to_string()))?;
        }
        Ok(())
    }
}

impl OverlayEditor for Editor {
    fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    fn apply_overlay(&mut self, op: OverlayOp) -> revisions::Result<()> {
        op.apply(&mut self.overlay)
    }
}

#[derive(Debug, Clone)]
enum Step {
    Type { run: usize, at: usize, text: String },
    Delete { run: usize, from: usize, len: usize },
    Bold { run: usize },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (any::<usize>(), any::<usize>(), "[a-z]{1,4}").prop_map(|(run, at, text)| Step::Type { run, at, text }),
        (any::<usize>(), any::<usize>(), 1usize..4).prop_map(|(run, from, len)| Step::Delete { run, from, len }),
        any::<usize>().prop_map(|run| Step::Bold { run }),
    ]
}

fn seeded() -> (Editor, NodeId) {
    let mut tree = DocumentTree::blank();
    let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
    tree.append(para, Node::run("The quick brown fox")).unwrap();
    (
        Editor {
            tree,
            overlay: Overlay::new(),
        },
        para,
    )
}

fn apply_step(ed: &mut Editor, para: NodeId, step: &Step) {
    let runs: Vec<NodeId> = ed.tree.children(para).to_vec();
    if runs.is_empty() {
        return;
    }
    let result = match step {
        Step::Type { run, at, text } => {
            let run = runs[run % runs.len()];
            let len = ed.tree.node(run).unwrap().text_len();
            tracked_insert_text(ed, "alice", run, at % (len + 1), text).map(|_| ())
        }
        Step::Delete { run, from, len } => {
            let run = runs[run % runs.len()];
            let total = ed.tree.node(run).unwrap().text_len();
            if total == 0 {
                return;
            }
            let start = from % total;
            let end = (start + len).min(total);
            tracked_remove_range(ed, "bob", TextRange::within(run, start, end)).map(|_| ())
        }
        Step::Bold { run } => {
            let run = runs[run % runs.len()];
            tracked_set_property(ed, "carol", run, Property::Bold, Some(true.into()))
        }
    };
    result.unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 100, .. ProptestConfig::default() })]

    #[test]
    fn review_round_trips(steps in prop::collection::vec(step_strategy(), 1..12)) {
        let (mut ed, para) = seeded();
        let original = ed.tree.text_of(para);
        for step in &steps {
            apply_step(&mut ed, para, step);
            ed.tree.check_invariants().unwrap();
        }
        prop_assert_eq!(ed.overlay.view(&ed.tree, ViewMode::Original).plain_text(), original.clone());
        let final_text = ed.overlay.view(&ed.tree, ViewMode::Final).plain_text();

        let mut rejected = Editor { tree: ed.tree.clone(), overlay: ed.overlay.clone() };
        reject_all(&mut rejected).unwrap();
        prop_assert_eq!(rejected.tree.text_of(para), original);
        prop_assert!(!rejected.overlay.has_changes());
        for run in rejected.tree.children(para) {
            prop_assert!(rejected.tree.node(*run).unwrap().direct_formatting().is_empty());
        }

        accept_all(&mut ed).unwrap();
        prop_assert_eq!(ed.tree.text_of(para), final_text);
        prop_assert!(!ed.overlay.has_changes());
    }
}
