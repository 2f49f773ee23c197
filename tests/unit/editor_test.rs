// SPDX-License-Identifier: GPL-3.0-only

use std::io::Cursor;

use capture_studio::editor::DEFAULT_TEXT;
use capture_studio::scene::{Color, ObjectId, Point, Shape};
use capture_studio::store::{self, keys, MemoryStore, StateStoreExt};
use capture_studio::tools::{PointerEvent, Tool};
use capture_studio::{CaptureSettings, Editor, EditorOp, HistoryError, SeedOutcome, StoreError};
use image::{ImageFormat, Rgba, RgbaImage};
use rstest::rstest;

fn editor_with_capacity(history_capacity: usize) -> Editor {
    Editor::new(&CaptureSettings {
        history_capacity,
        ..CaptureSettings::immediate()
    })
}

fn draw_rectangle(editor: &mut Editor, from: (f64, f64), to: (f64, f64)) {
    editor.set_tool(Tool::Rectangle);
    editor
        .apply(&EditorOp::Drag {
            from: Point::new(from.0, from.1),
            to: Point::new(to.0, to.1),
        })
        .unwrap();
}

fn pin_object(editor: &Editor, number: u32) -> Option<ObjectId> {
    editor
        .scene()
        .objects
        .iter()
        .find(|object| object.shape.pin_number() == Some(number))
        .map(|object| object.id)
}

fn png_data_url(width: u32, height: u32) -> String {
    let image = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
    let mut data = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .unwrap();
    store::encode_data_url(&data)
}

#[test]
fn pin_numbers_are_never_reused() {
    let mut editor = Editor::default();
    for i in 1..=5 {
        let number = editor.place_pin(Point::new(60.0 * f64::from(i), 100.0)).unwrap();
        assert_eq!(number, i);
    }

    editor.select(pin_object(&editor, 3));
    assert!(editor.delete_selected().unwrap());
    assert!(pin_object(&editor, 3).is_none());
    // The note outlives its marker
    assert!(editor.scene().comment(3).is_some());
    assert_eq!(editor.next_pin_number(), 6);

    assert!(editor.undo().unwrap());
    assert!(pin_object(&editor, 3).is_some());
    assert_eq!(editor.next_pin_number(), 6);

    assert_eq!(editor.place_pin(Point::new(500.0, 300.0)).unwrap(), 6);
}

#[test]
fn comment_tool_places_a_pin_and_returns_to_select() {
    let mut editor = Editor::default();
    editor.set_tool(Tool::Comment);
    editor.pointer(PointerEvent::Down(Point::new(40.0, 40.0))).unwrap();
    editor.pointer(PointerEvent::Up(Point::new(40.0, 40.0))).unwrap();

    assert_eq!(editor.tool(), Tool::Select);
    assert!(pin_object(&editor, 1).is_some());
    assert!(editor.update_comment(1, "check this").unwrap());
    assert_eq!(editor.scene().comment(1).unwrap().text, "check this");
    assert!(!editor.update_comment(42, "nobody home").unwrap());
}

#[test]
fn new_mutation_discards_redo() {
    let mut editor = Editor::default();
    draw_rectangle(&mut editor, (10.0, 10.0), (50.0, 50.0));
    assert!(editor.undo().unwrap());
    assert!(editor.history().can_redo());

    draw_rectangle(&mut editor, (100.0, 100.0), (150.0, 130.0));

    assert!(!editor.history().can_redo());
    assert!(!editor.redo().unwrap());
    assert_eq!(editor.scene().objects.len(), 1);
}

#[test]
fn undo_and_redo_walk_the_same_path() {
    let mut editor = Editor::default();
    let empty = editor.snapshot().unwrap();
    draw_rectangle(&mut editor, (10.0, 10.0), (50.0, 50.0));
    let one = editor.snapshot().unwrap();
    draw_rectangle(&mut editor, (100.0, 100.0), (150.0, 130.0));
    let two = editor.snapshot().unwrap();

    assert!(editor.undo().unwrap());
    assert_eq!(editor.snapshot().unwrap(), one);
    assert!(editor.undo().unwrap());
    assert_eq!(editor.snapshot().unwrap(), empty);
    assert!(!editor.undo().unwrap());

    assert!(editor.redo().unwrap());
    assert!(editor.redo().unwrap());
    assert_eq!(editor.snapshot().unwrap(), two);
    assert!(!editor.redo().unwrap());
}

#[test]
fn evicted_entries_raise_the_floor() {
    let mut editor = editor_with_capacity(2);
    draw_rectangle(&mut editor, (0.0, 0.0), (10.0, 10.0));
    draw_rectangle(&mut editor, (20.0, 20.0), (30.0, 30.0));
    draw_rectangle(&mut editor, (40.0, 40.0), (50.0, 50.0));
    assert_eq!(editor.history().len(), 2);

    assert!(editor.undo().unwrap());
    assert_eq!(editor.scene().objects.len(), 2);
    assert!(!editor.undo().unwrap());
    assert_eq!(editor.scene().objects.len(), 2);
}

#[test]
fn undo_keeps_the_active_tool_and_colour() {
    let mut editor = Editor::default();
    editor.set_color(Color::rgb(255, 0, 0));
    draw_rectangle(&mut editor, (10.0, 10.0), (60.0, 60.0));
    editor.set_tool(Tool::Arrow);

    assert!(editor.undo().unwrap());
    assert_eq!(editor.tool(), Tool::Arrow);
    assert_eq!(editor.color(), Color::rgb(255, 0, 0));
}

#[test]
fn corrupt_remote_snapshot_changes_nothing() {
    let mut editor = Editor::default();
    draw_rectangle(&mut editor, (10.0, 10.0), (50.0, 50.0));
    let before = editor.scene().clone();
    let entries = editor.history().len();

    let err = editor.apply_remote_snapshot("{\"width\": ").unwrap_err();

    assert!(matches!(err, HistoryError::Corrupt(_)));
    assert_eq!(editor.scene(), &before);
    assert_eq!(editor.history().len(), entries);
}

#[test]
fn remote_snapshot_is_recorded_and_undoable() {
    let mut source = Editor::default();
    draw_rectangle(&mut source, (5.0, 5.0), (25.0, 25.0));
    let snapshot = source.snapshot().unwrap();

    let mut editor = Editor::default();
    editor.apply_remote_snapshot(&snapshot).unwrap();
    assert_eq!(editor.scene().objects.len(), 1);

    assert!(editor.undo().unwrap());
    assert!(editor.scene().objects.is_empty());
}

#[test]
fn repeated_paste_cascades() {
    let mut editor = Editor::default();
    draw_rectangle(&mut editor, (10.0, 10.0), (60.0, 40.0));
    editor.apply(&EditorOp::SelectAt { x: 10.0, y: 25.0 }).unwrap();
    assert!(editor.selection().is_some());
    assert!(editor.copy());

    let first = editor.paste().unwrap().unwrap();
    let second = editor.paste().unwrap().unwrap();
    assert_ne!(first, second);

    let origin = |id| match editor.scene().object(id).map(|object| &object.shape) {
        Some(Shape::Rectangle { x, y, .. }) => (*x, *y),
        other => panic!("expected a rectangle, got {other:?}"),
    };
    assert_eq!(origin(first), (30.0, 30.0));
    assert_eq!(origin(second), (50.0, 50.0));
    assert_eq!(editor.selection(), Some(second));
}

#[test]
fn cut_removes_and_paste_restores() {
    let mut editor = Editor::default();
    draw_rectangle(&mut editor, (10.0, 10.0), (60.0, 40.0));
    editor.apply(&EditorOp::SelectAt { x: 60.0, y: 25.0 }).unwrap();

    assert!(editor.cut().unwrap());
    assert!(editor.scene().objects.is_empty());
    assert!(editor.paste().unwrap().is_some());
    assert_eq!(editor.scene().objects.len(), 1);
}

#[test]
fn dragging_a_selection_commits_once() {
    let mut editor = Editor::default();
    draw_rectangle(&mut editor, (10.0, 10.0), (60.0, 40.0));
    editor.set_tool(Tool::Select);
    let entries = editor.history().len();

    editor.pointer(PointerEvent::Down(Point::new(10.0, 20.0))).unwrap();
    editor.pointer(PointerEvent::Move(Point::new(20.0, 25.0))).unwrap();
    editor.pointer(PointerEvent::Move(Point::new(30.0, 30.0))).unwrap();
    editor.pointer(PointerEvent::Up(Point::new(40.0, 35.0))).unwrap();

    assert_eq!(editor.history().len(), entries + 1);
    let id = editor.selection().unwrap();
    match &editor.scene().object(id).unwrap().shape {
        Shape::Rectangle { x, y, .. } => assert_eq!((*x, *y), (40.0, 25.0)),
        other => panic!("expected a rectangle, got {other:?}"),
    }

    assert!(editor.undo().unwrap());
    match &editor.scene().object(id).unwrap().shape {
        Shape::Rectangle { x, y, .. } => assert_eq!((*x, *y), (10.0, 10.0)),
        other => panic!("expected a rectangle, got {other:?}"),
    }
}

#[test]
fn placed_text_is_selected_with_placeholder() {
    let mut editor = Editor::default();
    editor.set_tool(Tool::Text);
    editor.pointer(PointerEvent::Down(Point::new(200.0, 120.0))).unwrap();
    editor.pointer(PointerEvent::Up(Point::new(200.0, 120.0))).unwrap();

    let id = editor.selection().unwrap();
    match &editor.scene().object(id).unwrap().shape {
        Shape::Text { content, .. } => assert_eq!(content, DEFAULT_TEXT),
        other => panic!("expected text, got {other:?}"),
    }
    assert_eq!(editor.tool(), Tool::Select);
}

#[test]
fn clearing_keeps_the_base_image() {
    let mut editor = Editor::default();
    editor.load_image(RgbaImage::new(64, 48)).unwrap();
    draw_rectangle(&mut editor, (1.0, 1.0), (20.0, 20.0));
    editor.place_pin(Point::new(30.0, 30.0)).unwrap();

    assert!(editor.clear_annotations().unwrap());
    assert!(editor.scene().objects.is_empty());
    assert!(editor.scene().comments.is_empty());
    assert!(editor.scene().base_image.is_some());
    assert_eq!((editor.scene().width, editor.scene().height), (64, 48));
}

#[test]
fn loading_an_image_resets_history() {
    let mut editor = Editor::default();
    draw_rectangle(&mut editor, (10.0, 10.0), (50.0, 50.0));
    assert!(editor.history().can_undo());

    editor.load_image(RgbaImage::new(32, 32)).unwrap();

    assert!(!editor.history().can_undo());
    assert!(!editor.history().can_redo());
    assert!(editor.scene().objects.is_empty());
}

#[rstest]
#[case::image(Some(png_data_url(8, 6)), None, SeedOutcome::Image { width: 8, height: 6 })]
#[case::video(None, Some("blob:recording-1"), SeedOutcome::Video("blob:recording-1".to_string()))]
#[case::image_wins(Some(png_data_url(3, 2)), Some("blob:old"), SeedOutcome::Image { width: 3, height: 2 })]
#[case::empty(None, None, SeedOutcome::Empty)]
fn studio_opens_what_the_capture_left(
    #[case] image: Option<String>,
    #[case] video: Option<&str>,
    #[case] expected: SeedOutcome,
) {
    let state = MemoryStore::new();
    if let Some(image) = image {
        state.set(keys::CAPTURED_IMAGE, &image).unwrap();
    }
    if let Some(video) = video {
        state.set(keys::CAPTURED_VIDEO, video).unwrap();
    }

    let mut editor = Editor::default();
    let outcome = editor.seed_from_store(&state).unwrap();

    if let SeedOutcome::Image { width, height } = outcome {
        assert_eq!((editor.scene().width, editor.scene().height), (width, height));
        assert!(editor.scene().base_image.is_some());
        assert!(!editor.history().can_undo());
    } else {
        assert!(editor.scene().base_image.is_none());
    }
    assert_eq!(outcome, expected);
}

#[test]
fn garbage_in_the_store_is_rejected() {
    let state = MemoryStore::new();
    state.set(keys::CAPTURED_IMAGE, "https://example.com/shot.png").unwrap();

    let mut editor = Editor::default();
    let err = editor.seed_from_store(&state).unwrap_err();

    assert!(matches!(err, StoreError::NotDataUrl(_)));
    assert!(editor.scene().base_image.is_none());
}
