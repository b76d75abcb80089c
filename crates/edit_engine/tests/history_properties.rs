//! Randomized undo/redo exactness.
//!
//! After any accepted edit, `undo` must restore the exact state before it
//! and `redo` the exact state after it, tree and overlay alike, whether the
//! edit was tracked or not.

use doc_model::{DocumentTree, Node, NodeId, NodeKind, Property, PropertyValue, TextRange};
use edit_engine::EditingEngine;
use proptest::prelude::*;
use revisions::{CommentAnchor, Overlay};

#[derive(Debug, Clone)]
enum Step {
    InsertRun { para: usize, index: usize },
    InsertParagraph { index: usize },
    Remove { target: usize },
    Move { run: usize, para: usize, index: usize },
    Bold { run: usize, on: bool },
    FontSize { run: usize, size: u8 },
    Type { run: usize, at: usize },
    Cut { run: usize, from: usize, len: usize },
    Comment { run: usize },
    Track(bool),
    AcceptOrReject { pick: usize, accept: bool },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => (any::<usize>(), any::<usize>()).prop_map(|(para, index)| Step::InsertRun { para, index }),
        1 => any::<usize>().prop_map(|index| Step::InsertParagraph { index }),
        2 => any::<usize>().prop_map(|target| Step::Remove { target }),
        1 => (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(run, para, index)| Step::Move { run, para, index }),
        2 => (any::<usize>(), any::<bool>()).prop_map(|(run, on)| Step::Bold { run, on }),
        1 => (any::<usize>(), 6u8..40).prop_map(|(run, size)| Step::FontSize { run, size }),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(run, at)| Step::Type { run, at }),
        2 => (any::<usize>(), any::<usize>(), 1usize..5)
            .prop_map(|(run, from, len)| Step::Cut { run, from, len }),
        1 => any::<usize>().prop_map(|run| Step::Comment { run }),
        1 => any::<bool>().prop_map(Step::Track),
        1 => (any::<usize>(), any::<bool>()).prop_map(|(pick, accept)| Step::AcceptOrReject { pick, accept }),
    ]
}

fn seeded() -> EditingEngine {
    let mut tree = DocumentTree::blank();
    let section = tree.children(tree.root_id())[0];
    let first = tree.children(section)[0];
    tree.append(first, Node::run("Hello world")).unwrap();
    let second = tree.append(section, Node::paragraph()).unwrap();
    tree.append(second, Node::run("Second line")).unwrap();
    EditingEngine::with_tree(tree)
}

fn pick(ids: &[NodeId], i: usize) -> Option<NodeId> {
    (!ids.is_empty()).then(|| ids[i % ids.len()])
}

/// Apply one step. Returns Some(true) if a history entry was recorded.
fn apply_step(engine: &mut EditingEngine, step: &Step) -> bool {
    let tree = engine.tree();
    let paras = tree.nodes_of_kind(NodeKind::Paragraph);
    let runs = tree.nodes_of_kind(NodeKind::Run);
    let section = tree.children(tree.root_id())[0];
    let before = engine.history().undo_len();
    let applied = match step {
        Step::InsertRun { para, index } => pick(&paras, *para).map(|p| {
            let len = engine.tree().children(p).len();
            engine.insert(p, index % (len + 1), Node::run("new")).is_ok()
        }),
        Step::InsertParagraph { index } => {
            let len = engine.tree().children(section).len();
            Some(engine.insert(section, index % (len + 1), Node::paragraph()).is_ok())
        }
        Step::Remove { target } => {
            let mut candidates = runs.clone();
            candidates.extend(paras.iter().skip(1));
            pick(&candidates, *target).map(|n| engine.remove(n).is_ok())
        }
        Step::Move { run, para, index } => match (pick(&runs, *run), pick(&paras, *para)) {
            (Some(r), Some(p)) => {
                let len = engine.tree().children(p).len();
                Some(engine.move_node(r, p, index % (len + 1)).is_ok())
            }
            _ => None,
        },
        Step::Bold { run, on } => pick(&runs, *run).map(|r| {
            engine
                .set_direct_formatting(r, Property::Bold, on.then_some(PropertyValue::Bool(true)))
                .is_ok()
        }),
        Step::FontSize { run, size } => pick(&runs, *run).map(|r| {
            engine
                .set_direct_formatting(r, Property::FontSize, Some(PropertyValue::Points(f32::from(*size))))
                .is_ok()
        }),
        Step::Type { run, at } => pick(&runs, *run).map(|r| {
            let len = engine.tree().node(r).map(|n| n.text_len()).unwrap_or(0);
            engine.insert_text(r, at % (len + 1), "xy").is_ok()
        }),
        Step::Cut { run, from, len } => pick(&runs, *run).and_then(|r| {
            let total = engine.tree().node(r).map(|n| n.text_len()).unwrap_or(0);
            if total == 0 {
                return None;
            }
            let start = from % total;
            let end = (start + len).min(total);
            Some(engine.remove_range(TextRange::within(r, start, end)).is_ok())
        }),
        Step::Comment { run } => pick(&runs, *run).map(|r| {
            let len = engine.tree().node(r).map(|n| n.text_len()).unwrap_or(0);
            engine
                .add_comment(CommentAnchor::range(TextRange::within(r, 0, len)), "rita", "note")
                .is_ok()
        }),
        Step::Track(on) => {
            if *on {
                let _ = engine.begin_tracking("tess");
            } else {
                engine.end_tracking();
            }
            None
        }
        Step::AcceptOrReject { pick: i, accept } => {
            let ids: Vec<_> = engine.overlay().changes().iter().map(|c| c.id).collect();
            if ids.is_empty() {
                None
            } else {
                let id = ids[i % ids.len()];
                Some(if *accept {
                    engine.accept_change(id).is_ok()
                } else {
                    engine.reject_change(id).is_ok()
                })
            }
        }
    };
    applied == Some(true) && engine.history().undo_len() > before
}

fn state(engine: &EditingEngine) -> (DocumentTree, Overlay) {
    (engine.tree().clone(), engine.overlay().clone())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn undo_then_redo_is_exact(steps in prop::collection::vec(step_strategy(), 1..30)) {
        let mut engine = seeded();
        for step in &steps {
            // Keep every step in its own history entry.
            engine.selection_changed();
            let before = state(&engine);
            if !apply_step(&mut engine, step) {
                prop_assert_eq!(&engine.tree().clone(), &before.0);
                continue;
            }
            engine.tree().check_invariants().unwrap();
            let after = state(&engine);

            engine.undo().unwrap();
            prop_assert_eq!(&state(&engine), &before);
            engine.redo().unwrap();
            prop_assert_eq!(&state(&engine), &after);
        }
    }

    #[test]
    fn undo_everything_returns_to_start(steps in prop::collection::vec(step_strategy(), 1..20)) {
        let mut engine = seeded();
        let start = state(&engine);
        for step in &steps {
            engine.selection_changed();
            apply_step(&mut engine, step);
        }
        while engine.can_undo() {
            engine.undo().unwrap();
        }
        prop_assert_eq!(&state(&engine).0, &start.0);
        prop_assert_eq!(engine.overlay().changes(), start.1.changes());
        prop_assert_eq!(engine.overlay().comments(), start.1.comments());
    }
}
