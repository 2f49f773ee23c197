// SPDX-License-Identifier: GPL-3.0-only

use capture_studio::history::History;
use capture_studio::scene::Point;
use capture_studio::tools::Tool;
use capture_studio::{CaptureSettings, Editor, EditorOp};
use proptest::prelude::*;

/// Rectangles laid out on a grid so no press lands on an earlier shape
fn drag_for(index: usize) -> EditorOp {
    #[allow(clippy::cast_precision_loss)]
    let (col, row) = ((index % 10) as f64, (index / 10) as f64);
    EditorOp::Drag {
        from: Point::new(col * 100.0 + 10.0, row * 100.0 + 10.0),
        to: Point::new(col * 100.0 + 60.0, row * 100.0 + 50.0),
    }
}

proptest! {
    #[test]
    fn undoing_every_mutation_returns_to_the_baseline(count in 1usize..30) {
        let mut editor = Editor::new(&CaptureSettings::immediate());
        let baseline = editor.snapshot().unwrap();
        editor.set_tool(Tool::Rectangle);
        for index in 0..count {
            editor.apply(&drag_for(index)).unwrap();
        }
        prop_assert_eq!(editor.scene().objects.len(), count);

        for _ in 0..count {
            prop_assert!(editor.undo().unwrap());
        }
        prop_assert!(!editor.undo().unwrap());
        prop_assert_eq!(editor.snapshot().unwrap(), baseline);
        prop_assert_eq!(editor.history().redo_len(), count);
    }

    #[test]
    fn history_never_exceeds_capacity(
        capacity in 0usize..12,
        states in prop::collection::vec(0u8..6, 0..60),
    ) {
        let mut history = History::new(capacity);
        history.reset("base".to_string());
        for state in states {
            history.push(format!("s{state}"));
            prop_assert!(history.len() <= history.capacity());
            prop_assert!(history.len() >= 1);
        }
        prop_assert!(history.capacity() >= 2);
    }

    #[test]
    fn identical_pushes_coalesce(state in "s[0-9]{1,4}", repeats in 1usize..10) {
        let mut history = History::new(50);
        history.reset("base".to_string());
        prop_assert!(history.push(state.clone()));
        for _ in 0..repeats {
            prop_assert!(!history.push(state.clone()));
        }
        prop_assert_eq!(history.len(), 2);
        prop_assert_eq!(history.current(), Some(state.as_str()));
    }

    #[test]
    fn undo_then_redo_is_identity(count in 1usize..20, undos in 0usize..20) {
        let mut editor = Editor::new(&CaptureSettings::immediate());
        editor.set_tool(Tool::Rectangle);
        for index in 0..count {
            editor.apply(&drag_for(index)).unwrap();
        }
        let latest = editor.snapshot().unwrap();

        let undone = (0..undos).filter(|_| editor.undo().unwrap()).count();
        prop_assert_eq!(undone, undos.min(count));
        for _ in 0..undone {
            prop_assert!(editor.redo().unwrap());
        }
        prop_assert_eq!(editor.snapshot().unwrap(), latest);
    }
}
