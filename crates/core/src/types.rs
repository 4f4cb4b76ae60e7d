use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A position in the opaque 2D world coordinate space.
///
/// World Y increases going north; the screen-space inversion happens in
/// [`viewport::project`](crate::viewport::project), never here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f64,
    pub y: f64,
}

impl WorldPos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}
