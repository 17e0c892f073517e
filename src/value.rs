//! Value types that facts can carry.
//!
//! Fact arguments form a closed union so equality and matching are total,
//! well-defined operations. Values are plain data, never functions; resources
//! such as canvases or audio slots travel as opaque handles.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to an externally owned resource.
///
/// The engine never dereferences a handle; it only carries it between facts
/// and binding sets. The owner of the resource keeps the mapping from handle
/// to the real object (e.g. a canvas or an audio pool slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Creates a new random handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle:{}", self.0)
    }
}

/// A point in paper/projector space.
///
/// Equality is coordinate-wise and exact; the engine applies no tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[allow(missing_docs)]
    pub x: f64,
    #[allow(missing_docs)]
    pub y: f64,
}

impl Point {
    /// Creates a point from its coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Possible values a fact argument can hold.
///
/// # Examples
///
/// ```
/// use factlog::Value;
///
/// let num = Value::from(42.0);
/// let text = Value::from("red");
///
/// assert!(num.is_num());
/// assert_eq!(text.as_text(), Some("red"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Value {
    Num(f64),
    Text(String),
    Bool(bool),
    Point(Point),
    List(Vec<Value>),
    Handle(HandleId),
}

#[allow(missing_docs)]
impl Value {
    pub const fn is_num(&self) -> bool {
        matches!(self, Self::Num(_))
    }

    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_point(&self) -> bool {
        matches!(self, Self::Point(_))
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub const fn is_handle(&self) -> bool {
        matches!(self, Self::Handle(_))
    }

    pub const fn as_num(&self) -> Option<f64> {
        match self {
            Self::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_point(&self) -> Option<Point> {
        match self {
            Self::Point(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_handle(&self) -> Option<HandleId> {
        match self {
            Self::Handle(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Num(_) => "num",
            Self::Text(_) => "text",
            Self::Bool(_) => "bool",
            Self::Point(_) => "point",
            Self::List(_) => "list",
            Self::Handle(_) => "handle",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Point(v) => write!(f, "{v}"),
            Self::List(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Handle(v) => write!(f, "{v}"),
        }
    }
}

// Convenient From implementations
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Num(f64::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Num(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Num(f64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Point> for Value {
    fn from(v: Point) -> Self {
        Self::Point(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<HandleId> for Value {
    fn from(v: HandleId) -> Self {
        Self::Handle(v)
    }
}
