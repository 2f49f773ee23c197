// SPDX-License-Identifier: GPL-3.0-only

//! The annotation canvas's state
//!
//! A [`Scene`] is an ordered list of drawable objects (index order is
//! z-order), the comment list attached to pins, the canvas background and
//! the editor-only settings (tool, colour, viewport). Only the document part
//! is serialised into history snapshots; tool, colour and viewport survive
//! undo untouched.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tools::Tool;

/// An sRGB colour with alpha, serialised as `#rrggbb` or `#rrggbbaa`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Default stroke colour
    pub const ACCENT: Self = Self::rgb(0x00, 0xd4, 0xff);
    /// Default canvas background
    pub const CANVAS: Self = Self::rgb(0x0d, 0x0f, 0x14);
    /// Comment pin fill
    pub const PIN: Self = Self::rgb(0x4f, 0x7d, 0xf9);
    pub const WHITE: Self = Self::rgb(0xff, 0xff, 0xff);
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    #[must_use]
    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::ACCENT
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 0xff {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a #rrggbb or #rrggbbaa colour")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        Ok(Self {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: if hex.len() == 8 { byte(6)? } else { 0xff },
        })
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    fn distance_to_segment(self, a: Point, b: Point) -> f64 {
        let (abx, aby) = (b.x - a.x, b.y - a.y);
        let len_sq = abx * abx + aby * aby;
        let t = if len_sq == 0.0 {
            0.0
        } else {
            (((self.x - a.x) * abx + (self.y - a.y) * aby) / len_sq).clamp(0.0, 1.0)
        };
        let (cx, cy) = (a.x + abx * t, a.y + aby * t);
        ((self.x - cx).powi(2) + (self.y - cy).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub from: Point,
    pub to: Point,
}

/// Length of each arrowhead stroke
pub const ARROW_HEAD_LENGTH: f64 = 14.0;
/// Angle between the shaft and each head stroke
pub const ARROW_HEAD_HALF_ANGLE: f64 = std::f64::consts::PI / 6.0;
/// Radius of a comment pin marker
pub const PIN_RADIUS: f64 = 14.0;
/// Horizontal advance per character, in em
pub const TEXT_ADVANCE: f64 = 0.6;
/// Pointer tolerance when hit-testing strokes
const HIT_TOLERANCE: f64 = 4.0;

/// Shaft plus two head strokes pointing back from `to`
#[must_use]
pub fn arrow_segments(from: Point, to: Point) -> [Segment; 3] {
    let angle = (to.y - from.y).atan2(to.x - from.x);
    let head = |a: f64| Segment {
        from: to,
        to: Point::new(
            to.x - ARROW_HEAD_LENGTH * a.cos(),
            to.y - ARROW_HEAD_LENGTH * a.sin(),
        ),
    };
    [
        Segment { from, to },
        head(angle - ARROW_HEAD_HALF_ANGLE),
        head(angle + ARROW_HEAD_HALF_ANGLE),
    ]
}

/// Identifier of an image in the scene's asset table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub u64);

/// Identifier of a drawable object, unique within an editing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Shape {
    Rectangle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        stroke: Color,
        stroke_width: f64,
        corner_radius: f64,
    },
    /// Line plus two head strokes, moved and deleted as one group
    Arrow {
        segments: [Segment; 3],
        stroke: Color,
        stroke_width: f64,
    },
    Path {
        points: Vec<Point>,
        stroke: Color,
        stroke_width: f64,
    },
    Text {
        x: f64,
        y: f64,
        content: String,
        font_size: f64,
        fill: Color,
    },
    /// Raster placed on the canvas; pixels live in the asset table
    Image {
        x: f64,
        y: f64,
        scale: f64,
        image: ImageId,
        width: u32,
        height: u32,
    },
    /// Numbered comment marker centred on `(x, y)`
    Pin {
        number: u32,
        x: f64,
        y: f64,
        radius: f64,
        fill: Color,
        stroke: Color,
    },
}

impl Shape {
    #[must_use]
    pub fn rectangle(start: Point, end: Point, stroke: Color) -> Self {
        Self::Rectangle {
            x: start.x.min(end.x),
            y: start.y.min(end.y),
            width: (end.x - start.x).abs(),
            height: (end.y - start.y).abs(),
            stroke,
            stroke_width: 2.0,
            corner_radius: 4.0,
        }
    }

    #[must_use]
    pub fn arrow(from: Point, to: Point, stroke: Color) -> Self {
        Self::Arrow {
            segments: arrow_segments(from, to),
            stroke,
            stroke_width: 2.0,
        }
    }

    #[must_use]
    pub fn text(at: Point, content: impl Into<String>) -> Self {
        Self::Text {
            x: at.x,
            y: at.y,
            content: content.into(),
            font_size: 16.0,
            fill: Color::WHITE,
        }
    }

    #[must_use]
    pub fn pin(number: u32, at: Point, stroke: Color) -> Self {
        Self::Pin {
            number,
            x: at.x,
            y: at.y,
            radius: PIN_RADIUS,
            fill: Color::PIN,
            stroke,
        }
    }

    /// Axis-aligned bounds as `(min, max)`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> (Point, Point) {
        match self {
            Self::Rectangle {
                x, y, width, height, ..
            } => (Point::new(*x, *y), Point::new(x + width, y + height)),
            Self::Arrow { segments, .. } => points_bounds(
                segments.iter().flat_map(|s| [s.from, s.to]),
            ),
            Self::Path { points, .. } => points_bounds(points.iter().copied()),
            Self::Text {
                x,
                y,
                content,
                font_size,
                ..
            } => {
                let longest = content.lines().map(|l| l.chars().count()).max().unwrap_or(0);
                let lines = content.lines().count().max(1);
                let width = longest as f64 * font_size * TEXT_ADVANCE;
                let height = lines as f64 * font_size;
                (Point::new(*x, *y), Point::new(x + width, y + height))
            }
            Self::Image {
                x,
                y,
                scale,
                width,
                height,
                ..
            } => (
                Point::new(*x, *y),
                Point::new(x + f64::from(*width) * scale, y + f64::from(*height) * scale),
            ),
            Self::Pin { x, y, radius, .. } => (
                Point::new(x - radius, y - radius),
                Point::new(x + radius, y + radius),
            ),
        }
    }

    /// Whether `p` lands on the shape
    #[must_use]
    pub fn hit(&self, p: Point) -> bool {
        match self {
            Self::Arrow { segments, .. } => segments
                .iter()
                .any(|s| p.distance_to_segment(s.from, s.to) <= HIT_TOLERANCE),
            Self::Path { points, .. } => points
                .windows(2)
                .any(|w| p.distance_to_segment(w[0], w[1]) <= HIT_TOLERANCE),
            Self::Pin { x, y, radius, .. } => {
                (p.x - x).powi(2) + (p.y - y).powi(2) <= radius.powi(2)
            }
            _ => {
                let (min, max) = self.bounds();
                p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y
            }
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        match self {
            Self::Rectangle { x, y, .. }
            | Self::Text { x, y, .. }
            | Self::Image { x, y, .. }
            | Self::Pin { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            Self::Arrow { segments, .. } => {
                for s in segments.iter_mut() {
                    s.from = s.from.offset(dx, dy);
                    s.to = s.to.offset(dx, dy);
                }
            }
            Self::Path { points, .. } => {
                for p in points.iter_mut() {
                    *p = p.offset(dx, dy);
                }
            }
        }
    }

    #[must_use]
    pub fn pin_number(&self) -> Option<u32> {
        match self {
            Self::Pin { number, .. } => Some(*number),
            _ => None,
        }
    }
}

fn points_bounds(points: impl Iterator<Item = Point>) -> (Point, Point) {
    let mut min = Point::new(f64::INFINITY, f64::INFINITY);
    let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min = Point::new(min.x.min(p.x), min.y.min(p.y));
        max = Point::new(max.x.max(p.x), max.y.max(p.y));
    }
    if min.x > max.x {
        return (Point::default(), Point::default());
    }
    (min, max)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub shape: Shape,
}

/// Free-text note attached to a numbered pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Pan and zoom of the editing surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    /// Map a pointer position on screen to scene coordinates
    #[must_use]
    pub fn to_scene(&self, screen: Point) -> Point {
        let zoom = if self.zoom > 0.0 { self.zoom } else { 1.0 };
        Point::new((screen.x - self.pan_x) / zoom, (screen.y - self.pan_y) / zoom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub background: Color,
    /// Captured raster underneath every object
    pub base_image: Option<ImageId>,
    pub objects: Vec<SceneObject>,
    pub comments: Vec<Comment>,
    #[serde(skip)]
    pub tool: Tool,
    #[serde(skip)]
    pub color: Color,
    #[serde(skip)]
    pub viewport: Viewport,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(1280, 720, Color::CANVAS)
    }
}

impl Scene {
    #[must_use]
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        Self {
            width,
            height,
            background,
            base_image: None,
            objects: Vec::new(),
            comments: Vec::new(),
            tool: Tool::default(),
            color: Color::default(),
            viewport: Viewport::default(),
        }
    }

    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    /// Topmost object under `p`
    #[must_use]
    pub fn hit_test(&self, p: Point) -> Option<ObjectId> {
        self.objects
            .iter()
            .rev()
            .find(|o| o.shape.hit(p))
            .map(|o| o.id)
    }

    #[must_use]
    pub fn comment(&self, id: u32) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }
}

/// Immutable rasters referenced by the scene, shared across snapshots
#[derive(Debug, Clone, Default)]
pub struct ImageAssets {
    images: HashMap<ImageId, Arc<RgbaImage>>,
    next_id: u64,
}

impl ImageAssets {
    pub fn insert(&mut self, image: RgbaImage) -> ImageId {
        self.next_id += 1;
        let id = ImageId(self.next_id);
        self.images.insert(id, Arc::new(image));
        id
    }

    #[must_use]
    pub fn get(&self, id: ImageId) -> Option<&Arc<RgbaImage>> {
        self.images.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ImageId) -> bool {
        self.images.contains_key(&id)
    }
}
