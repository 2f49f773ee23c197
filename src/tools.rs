// SPDX-License-Identifier: GPL-3.0-only

//! Active-tool state machine
//!
//! One transition function maps `(tool, gesture, pointer event)` to an
//! [`Effect`]. The editor applies effects; nothing here touches the scene.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::scene::{Color, ObjectId, Point, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Arrow,
    Pencil,
    Text,
    Comment,
}

impl Tool {
    pub const ALL: [Tool; 6] = [
        Tool::Select,
        Tool::Rectangle,
        Tool::Arrow,
        Tool::Pencil,
        Tool::Text,
        Tool::Comment,
    ];

    /// Tools that return to `Select` after a single placement
    #[must_use]
    pub fn is_one_shot(self) -> bool {
        matches!(self, Self::Text | Self::Comment)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Rectangle => "rectangle",
            Self::Arrow => "arrow",
            Self::Pencil => "pencil",
            Self::Text => "text",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| format!("unknown tool `{s}`"))
    }
}

/// Pointer input in scene coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
}

/// What the editor should do in response to a pointer event
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    /// Draw an in-progress shape over the scene without touching history
    Preview(Shape),
    /// A gesture finished: add the shape and commit
    Commit(Shape),
    /// A gesture finished with nothing worth keeping
    Discard,
    PlaceText(Point),
    PlacePin(Point),
    Select(ObjectId),
    ClearSelection,
    MoveSelection { dx: f64, dy: f64 },
    /// A drag ended with a final delta; commit if anything moved
    FinishMove { dx: f64, dy: f64 },
}

#[derive(Debug, Clone, PartialEq, Default)]
enum Gesture {
    #[default]
    Idle,
    Rectangle { start: Point },
    Arrow { start: Point },
    Stroke { points: Vec<Point> },
    Drag { last: Point },
}

/// Shapes smaller than this on both axes are dropped
const MIN_EXTENT: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct ToolMachine {
    tool: Tool,
    color: Color,
    gesture: Gesture,
}

impl ToolMachine {
    #[must_use]
    pub fn new(tool: Tool, color: Color) -> Self {
        Self {
            tool,
            color,
            gesture: Gesture::Idle,
        }
    }

    #[must_use]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    #[must_use]
    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Switch tools, abandoning any gesture in progress
    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
        self.gesture = Gesture::Idle;
    }

    #[must_use]
    pub fn is_gesture_active(&self) -> bool {
        self.gesture != Gesture::Idle
    }

    /// The transition function. `hit` is the topmost object under the
    /// pointer; drawing tools ignore presses that land on an object.
    pub fn handle(&mut self, event: PointerEvent, hit: Option<ObjectId>) -> Effect {
        let color = self.color;
        match (self.tool, &mut self.gesture, event) {
            (Tool::Select, Gesture::Idle, PointerEvent::Down(p)) => match hit {
                Some(id) => {
                    self.gesture = Gesture::Drag { last: p };
                    Effect::Select(id)
                }
                None => Effect::ClearSelection,
            },
            (Tool::Select, Gesture::Drag { last }, PointerEvent::Move(p)) => {
                let (dx, dy) = (p.x - last.x, p.y - last.y);
                *last = p;
                Effect::MoveSelection { dx, dy }
            }
            (Tool::Select, Gesture::Drag { last }, PointerEvent::Up(p)) => {
                let (dx, dy) = (p.x - last.x, p.y - last.y);
                self.gesture = Gesture::Idle;
                Effect::FinishMove { dx, dy }
            }

            (_, Gesture::Idle, PointerEvent::Down(_)) if hit.is_some() => Effect::None,

            (Tool::Rectangle, Gesture::Idle, PointerEvent::Down(p)) => {
                self.gesture = Gesture::Rectangle { start: p };
                Effect::Preview(Shape::rectangle(p, p, color))
            }
            (Tool::Rectangle, Gesture::Rectangle { start }, PointerEvent::Move(p)) => {
                Effect::Preview(Shape::rectangle(*start, p, color))
            }
            (Tool::Rectangle, Gesture::Rectangle { start }, PointerEvent::Up(p)) => {
                let start = *start;
                self.gesture = Gesture::Idle;
                if (p.x - start.x).abs() < MIN_EXTENT && (p.y - start.y).abs() < MIN_EXTENT {
                    Effect::Discard
                } else {
                    Effect::Commit(Shape::rectangle(start, p, color))
                }
            }

            (Tool::Arrow, Gesture::Idle, PointerEvent::Down(p)) => {
                self.gesture = Gesture::Arrow { start: p };
                Effect::None
            }
            (Tool::Arrow, Gesture::Arrow { start }, PointerEvent::Move(p)) => {
                Effect::Preview(Shape::Path {
                    points: vec![*start, p],
                    stroke: color,
                    stroke_width: 2.0,
                })
            }
            (Tool::Arrow, Gesture::Arrow { start }, PointerEvent::Up(p)) => {
                let start = *start;
                self.gesture = Gesture::Idle;
                if (p.x - start.x).abs() < MIN_EXTENT && (p.y - start.y).abs() < MIN_EXTENT {
                    Effect::Discard
                } else {
                    Effect::Commit(Shape::arrow(start, p, color))
                }
            }

            (Tool::Pencil, Gesture::Idle, PointerEvent::Down(p)) => {
                self.gesture = Gesture::Stroke { points: vec![p] };
                Effect::None
            }
            (Tool::Pencil, Gesture::Stroke { points }, PointerEvent::Move(p)) => {
                if points.last() != Some(&p) {
                    points.push(p);
                }
                Effect::Preview(Shape::Path {
                    points: points.clone(),
                    stroke: color,
                    stroke_width: 2.0,
                })
            }
            (Tool::Pencil, Gesture::Stroke { points }, PointerEvent::Up(p)) => {
                let mut points = std::mem::take(points);
                if points.last() != Some(&p) {
                    points.push(p);
                }
                self.gesture = Gesture::Idle;
                if points.len() < 2 {
                    Effect::Discard
                } else {
                    Effect::Commit(Shape::Path {
                        points,
                        stroke: color,
                        stroke_width: 2.0,
                    })
                }
            }

            (Tool::Text, Gesture::Idle, PointerEvent::Down(p)) => {
                self.tool = Tool::Select;
                Effect::PlaceText(p)
            }
            (Tool::Comment, Gesture::Idle, PointerEvent::Down(p)) => {
                self.tool = Tool::Select;
                Effect::PlacePin(p)
            }

            _ => Effect::None,
        }
    }
}
