// SPDX-License-Identifier: GPL-3.0-only

//! The annotation editor
//!
//! [`Editor`] owns the scene, its image assets and the undo history. Every
//! completed user action is turned into exactly one history entry through
//! [`Editor::commit_mutation`]; previews and selection changes never touch
//! history. Restores decode the whole snapshot before anything is replaced,
//! so a corrupt entry leaves both the scene and the stacks as they were.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{HistoryError, StoreError};
use crate::history::History;
use crate::scene::{Color, Comment, ImageAssets, ObjectId, Point, Scene, SceneObject, Shape};
use crate::settings::CaptureSettings;
use crate::store::{self, keys, StateStore, StateStoreExt};
use crate::tools::{Effect, PointerEvent, Tool, ToolMachine};

/// Placeholder content of a freshly placed text object
pub const DEFAULT_TEXT: &str = "Type here";

/// What the studio found in the persisted state when it opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedOutcome {
    /// A captured image became the base layer
    Image { width: u32, height: u32 },
    /// A recording is waiting; the scene is left alone
    Video(String),
    /// Nothing to open
    Empty,
}

/// One scripted editor action, as replayed by `capture-studio annotate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditorOp {
    SetTool { tool: Tool },
    SetColor { color: Color },
    SetBackground { color: Color },
    Down { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    Up { x: f64, y: f64 },
    /// Down, move and up in one step
    Drag { from: Point, to: Point },
    /// Select the topmost object under a point
    SelectAt { x: f64, y: f64 },
    Delete,
    Copy,
    Cut,
    Paste,
    Undo,
    Redo,
    Clear,
    UpdateComment { id: u32, text: String },
    EditText { id: ObjectId, content: String },
}

#[derive(Debug, Clone)]
struct ClipboardEntry {
    shape: Shape,
    pastes: u32,
}

pub struct Editor {
    scene: Scene,
    assets: ImageAssets,
    history: History,
    tools: ToolMachine,
    selection: Option<ObjectId>,
    preview: Option<Shape>,
    clipboard: Option<ClipboardEntry>,
    paste_offset: f64,
    next_object_id: u64,
    /// Session counter for comment pins; undo never rewinds it
    next_pin: u32,
    moved: bool,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(&CaptureSettings::default())
    }
}

impl Editor {
    #[must_use]
    pub fn new(settings: &CaptureSettings) -> Self {
        let mut scene = Scene::default();
        scene.background = settings.canvas_background;
        scene.color = settings.stroke_color;

        let mut editor = Self {
            scene,
            assets: ImageAssets::default(),
            history: History::new(settings.history_capacity),
            tools: ToolMachine::new(Tool::Select, settings.stroke_color),
            selection: None,
            preview: None,
            clipboard: None,
            paste_offset: settings.paste_offset,
            next_object_id: 1,
            next_pin: 1,
            moved: false,
        };
        editor.reset_history();
        editor
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[must_use]
    pub fn assets(&self) -> &ImageAssets {
        &self.assets
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn selection(&self) -> Option<ObjectId> {
        self.selection
    }

    /// Shape being drawn but not yet committed
    #[must_use]
    pub fn preview(&self) -> Option<&Shape> {
        self.preview.as_ref()
    }

    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tools.tool()
    }

    #[must_use]
    pub fn color(&self) -> Color {
        self.tools.color()
    }

    /// Number the next comment pin will get
    #[must_use]
    pub fn next_pin_number(&self) -> u32 {
        self.next_pin
    }

    /// Serialised document part of the scene, as stored in history
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn snapshot(&self) -> Result<String, HistoryError> {
        Ok(serde_json::to_string(&self.scene)?)
    }

    /// Record the current scene as one history entry. Returns `false` when
    /// the scene did not change since the last entry.
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn commit_mutation(&mut self) -> Result<bool, HistoryError> {
        let snapshot = self.snapshot()?;
        let pushed = self.history.push(snapshot);
        if pushed {
            debug!(entries = self.history.len(), "committed scene mutation");
        }
        Ok(pushed)
    }

    /// Restore the previous entry. Returns `false` at the floor.
    ///
    /// # Errors
    /// Returns `HistoryError` if the entry cannot be restored; the scene and
    /// history are unchanged in that case
    pub fn undo(&mut self) -> Result<bool, HistoryError> {
        let Some(target) = self.history.undo_target() else {
            return Ok(false);
        };
        let scene = self.decode(target)?;
        self.history.step_back();
        self.replace_scene(scene);
        Ok(true)
    }

    /// Re-apply the most recently undone entry. Returns `false` when there is
    /// nothing to redo.
    ///
    /// # Errors
    /// Returns `HistoryError` if the entry cannot be restored; the scene and
    /// history are unchanged in that case
    pub fn redo(&mut self) -> Result<bool, HistoryError> {
        let Some(target) = self.history.redo_target() else {
            return Ok(false);
        };
        let scene = self.decode(target)?;
        self.history.step_forward();
        self.replace_scene(scene);
        Ok(true)
    }

    /// Replace the document with one drawn elsewhere and record it
    ///
    /// # Errors
    /// Returns `HistoryError` if `data` is not a valid snapshot; nothing
    /// changes in that case
    pub fn apply_remote_snapshot(&mut self, data: &str) -> Result<(), HistoryError> {
        let scene = self.decode(data)?;
        self.replace_scene(scene);
        self.commit_mutation()?;
        Ok(())
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tools.set_tool(tool);
        self.scene.tool = tool;
        self.preview = None;
        if tool != Tool::Select {
            self.selection = None;
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.tools.set_color(color);
        self.scene.color = color;
    }

    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn set_background(&mut self, color: Color) -> Result<bool, HistoryError> {
        self.scene.background = color;
        self.commit_mutation()
    }

    /// Feed one pointer event, in scene coordinates, through the active tool
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if a completed action cannot be recorded
    pub fn pointer(&mut self, event: PointerEvent) -> Result<(), HistoryError> {
        let hit = match event {
            PointerEvent::Down(p) => self.scene.hit_test(p),
            PointerEvent::Move(_) | PointerEvent::Up(_) => None,
        };
        let effect = self.tools.handle(event, hit);
        self.scene.tool = self.tools.tool();

        match effect {
            Effect::None => {}
            Effect::Preview(shape) => self.preview = Some(shape),
            Effect::Discard => self.preview = None,
            Effect::Commit(shape) => {
                self.preview = None;
                self.add_object(shape);
                self.commit_mutation()?;
            }
            Effect::PlaceText(at) => {
                let id = self.add_object(Shape::text(at, DEFAULT_TEXT));
                self.selection = Some(id);
                self.commit_mutation()?;
            }
            Effect::PlacePin(at) => {
                self.place_pin(at)?;
            }
            Effect::Select(id) => {
                self.selection = Some(id);
                self.moved = false;
            }
            Effect::ClearSelection => self.selection = None,
            Effect::MoveSelection { dx, dy } => self.move_selected(dx, dy),
            Effect::FinishMove { dx, dy } => {
                self.move_selected(dx, dy);
                if std::mem::take(&mut self.moved) {
                    self.commit_mutation()?;
                }
            }
        }
        Ok(())
    }

    /// Drop a numbered pin and its empty comment at `at`
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn place_pin(&mut self, at: Point) -> Result<u32, HistoryError> {
        let number = self.next_pin;
        self.next_pin += 1;
        self.add_object(Shape::pin(number, at, self.tools.color()));
        self.scene.comments.push(Comment {
            id: number,
            x: at.x,
            y: at.y,
            text: String::new(),
        });
        self.commit_mutation()?;
        Ok(number)
    }

    /// Place a raster on the canvas as a movable object
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn insert_image(&mut self, image: RgbaImage, at: Point) -> Result<ObjectId, HistoryError> {
        let (width, height) = image.dimensions();
        let asset = self.assets.insert(image);
        let id = self.add_object(Shape::Image {
            x: at.x,
            y: at.y,
            scale: 1.0,
            image: asset,
            width,
            height,
        });
        self.commit_mutation()?;
        Ok(id)
    }

    /// Select an object directly, bypassing hit-testing
    pub fn select(&mut self, id: Option<ObjectId>) {
        self.selection = id.filter(|id| self.scene.object(*id).is_some());
    }

    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn delete_selected(&mut self) -> Result<bool, HistoryError> {
        let Some(id) = self.selection.take() else {
            return Ok(false);
        };
        let before = self.scene.objects.len();
        self.scene.objects.retain(|object| object.id != id);
        if self.scene.objects.len() == before {
            return Ok(false);
        }
        self.commit_mutation()
    }

    /// Copy the selected object. Pins are tied to their comment and are not
    /// copied.
    pub fn copy(&mut self) -> bool {
        let Some(object) = self.selection.and_then(|id| self.scene.object(id)) else {
            return false;
        };
        if object.shape.pin_number().is_some() {
            return false;
        }
        self.clipboard = Some(ClipboardEntry {
            shape: object.shape.clone(),
            pastes: 0,
        });
        true
    }

    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn cut(&mut self) -> Result<bool, HistoryError> {
        if !self.copy() {
            return Ok(false);
        }
        self.delete_selected()
    }

    /// Paste the clipboard, offset further for every repeated paste, and
    /// select the copy
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn paste(&mut self) -> Result<Option<ObjectId>, HistoryError> {
        let Some(entry) = self.clipboard.as_mut() else {
            return Ok(None);
        };
        entry.pastes += 1;
        let offset = self.paste_offset * f64::from(entry.pastes);
        let mut shape = entry.shape.clone();
        shape.translate(offset, offset);

        let id = self.add_object(shape);
        self.selection = Some(id);
        self.commit_mutation()?;
        Ok(Some(id))
    }

    /// Replace the text of a comment. Returns `false` for an unknown id.
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn update_comment(&mut self, id: u32, text: &str) -> Result<bool, HistoryError> {
        let Some(comment) = self.scene.comments.iter_mut().find(|c| c.id == id) else {
            return Ok(false);
        };
        if comment.text == text {
            return Ok(false);
        }
        comment.text = text.to_string();
        self.commit_mutation()
    }

    /// Replace the content of a text object. Returns `false` if `id` is not
    /// a text object.
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn edit_text(&mut self, id: ObjectId, content: &str) -> Result<bool, HistoryError> {
        match self.scene.object_mut(id).map(|object| &mut object.shape) {
            Some(Shape::Text { content: current, .. }) => {
                *current = content.to_string();
            }
            _ => return Ok(false),
        }
        self.commit_mutation()
    }

    /// Remove every object and comment, keeping the base image
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn clear_annotations(&mut self) -> Result<bool, HistoryError> {
        self.scene.objects.clear();
        self.scene.comments.clear();
        self.selection = None;
        self.preview = None;
        self.commit_mutation()
    }

    /// Start a new document on top of `image` and make it the history floor
    ///
    /// # Errors
    /// Returns `HistoryError::Corrupt` if the scene cannot be encoded
    pub fn load_image(&mut self, image: RgbaImage) -> Result<(), HistoryError> {
        let (width, height) = image.dimensions();
        let base = self.assets.insert(image);

        let mut scene = Scene::new(width, height, self.scene.background);
        scene.base_image = Some(base);
        scene.tool = self.scene.tool;
        scene.color = self.scene.color;
        self.scene = scene;
        self.selection = None;
        self.preview = None;

        let baseline = self.snapshot()?;
        self.history.reset(baseline);
        info!(width, height, "loaded base image");
        Ok(())
    }

    /// Open whatever the capture side left in `store`
    ///
    /// # Errors
    /// Returns `StoreError` if the stored image is malformed or undecodable
    pub fn seed_from_store(&mut self, state: &dyn StateStore) -> Result<SeedOutcome, StoreError> {
        if let Some(url) = state.get::<String>(keys::CAPTURED_IMAGE)? {
            let png = store::decode_data_url(&url)?;
            let image = image::load_from_memory(&png)?.to_rgba8();
            let (width, height) = image.dimensions();
            self.load_image(image)?;
            return Ok(SeedOutcome::Image { width, height });
        }
        if let Some(video) = state.get::<String>(keys::CAPTURED_VIDEO)? {
            return Ok(SeedOutcome::Video(video));
        }
        Ok(SeedOutcome::Empty)
    }

    /// Run one scripted action
    ///
    /// # Errors
    /// Returns `HistoryError` if the action could not be recorded or restored
    pub fn apply(&mut self, op: &EditorOp) -> Result<(), HistoryError> {
        match op {
            EditorOp::SetTool { tool } => self.set_tool(*tool),
            EditorOp::SetColor { color } => self.set_color(*color),
            EditorOp::SetBackground { color } => {
                self.set_background(*color)?;
            }
            EditorOp::Down { x, y } => self.pointer(PointerEvent::Down(Point::new(*x, *y)))?,
            EditorOp::Move { x, y } => self.pointer(PointerEvent::Move(Point::new(*x, *y)))?,
            EditorOp::Up { x, y } => self.pointer(PointerEvent::Up(Point::new(*x, *y)))?,
            EditorOp::Drag { from, to } => {
                self.pointer(PointerEvent::Down(*from))?;
                self.pointer(PointerEvent::Move(*to))?;
                self.pointer(PointerEvent::Up(*to))?;
            }
            EditorOp::SelectAt { x, y } => {
                let hit = self.scene.hit_test(Point::new(*x, *y));
                self.select(hit);
            }
            EditorOp::Delete => {
                self.delete_selected()?;
            }
            EditorOp::Copy => {
                self.copy();
            }
            EditorOp::Cut => {
                self.cut()?;
            }
            EditorOp::Paste => {
                self.paste()?;
            }
            EditorOp::Undo => {
                self.undo()?;
            }
            EditorOp::Redo => {
                self.redo()?;
            }
            EditorOp::Clear => {
                self.clear_annotations()?;
            }
            EditorOp::UpdateComment { id, text } => {
                self.update_comment(*id, text)?;
            }
            EditorOp::EditText { id, content } => {
                self.edit_text(*id, content)?;
            }
        }
        Ok(())
    }

    fn reset_history(&mut self) {
        match self.snapshot() {
            Ok(baseline) => self.history.reset(baseline),
            Err(err) => warn!(error = %err, "could not record the initial scene"),
        }
    }

    fn add_object(&mut self, shape: Shape) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        self.scene.objects.push(SceneObject { id, shape });
        id
    }

    fn move_selected(&mut self, dx: f64, dy: f64) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        if let Some(object) = self.selection.and_then(|id| self.scene.object_mut(id)) {
            object.shape.translate(dx, dy);
            self.moved = true;
        }
    }

    /// Parse a snapshot into a complete scene without touching `self`
    fn decode(&self, snapshot: &str) -> Result<Scene, HistoryError> {
        let mut scene: Scene = serde_json::from_str(snapshot)?;

        let images = scene.objects.iter().filter_map(|object| match object.shape {
            Shape::Image { image, .. } => Some(image),
            _ => None,
        });
        if let Some(missing) = scene
            .base_image
            .into_iter()
            .chain(images)
            .find(|id| !self.assets.contains(*id))
        {
            return Err(HistoryError::MissingAsset(missing.0));
        }

        scene.tool = self.scene.tool;
        scene.color = self.scene.color;
        scene.viewport = self.scene.viewport;
        Ok(scene)
    }

    fn replace_scene(&mut self, scene: Scene) {
        self.scene = scene;
        self.preview = None;
        self.moved = false;
        if let Some(id) = self.selection {
            if self.scene.object(id).is_none() {
                self.selection = None;
            }
        }

        // Ids seen in a restored or remote scene are never handed out again
        let max_object = self.scene.objects.iter().map(|o| o.id.0).max().unwrap_or(0);
        self.next_object_id = self.next_object_id.max(max_object + 1);
        let max_pin = self
            .scene
            .objects
            .iter()
            .filter_map(|o| o.shape.pin_number())
            .chain(self.scene.comments.iter().map(|c| c.id))
            .max()
            .unwrap_or(0);
        self.next_pin = self.next_pin.max(max_pin + 1);
    }
}
