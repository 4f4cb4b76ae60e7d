//! World-to-screen projection for the tactical map.
//!
//! [`project`] turns a world position into an unscaled content-box position:
//! world coordinates are normalized into the unit square, the Y axis is
//! inverted (world Y grows north, screen Y grows down), and the square
//! content box is letterboxed into the viewport. Pan and zoom are *not* part
//! of the projection; they live in [`ViewTransform`] and are applied on top
//! at render time so that the projection itself stays a pure function of
//! bounds and viewport size.

use serde::{Deserialize, Serialize};

use crate::types::WorldPos;

/// Minimum zoom factor accepted by [`ViewTransform`].
pub const MIN_ZOOM: f64 = 0.5;

/// Maximum zoom factor accepted by [`ViewTransform`].
pub const MAX_ZOOM: f64 = 10.0;

/// The fixed square world region shown on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl WorldBounds {
    /// The default world region, [-3000, 3000] on both axes.
    pub const DEFAULT: WorldBounds = WorldBounds {
        min_x: -3000.0,
        max_x: 3000.0,
        min_y: -3000.0,
        max_y: 3000.0,
    };

    /// Clamp a world position into the bounds so far-out markers render at
    /// the map edge instead of far off-screen.
    pub fn clamp(&self, pos: WorldPos) -> WorldPos {
        WorldPos {
            x: pos.x.clamp(self.min_x, self.max_x),
            y: pos.y.clamp(self.min_y, self.max_y),
        }
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Viewport dimensions in screen pixels. Zero/negative dimensions mean the
/// viewport has not been measured yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether the viewport has usable dimensions.
    pub fn is_ready(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Pixel padding inside the content box, for map images with margins.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EdgePadding {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// A position in screen pixels, relative to the viewport origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPos {
    pub x: f64,
    pub y: f64,
}

/// Project a world position into the viewport's content box.
///
/// The content box is the largest square that fits the viewport, centered:
/// a wide viewport letterboxes horizontally, a tall one vertically. Returns
/// `None` while the viewport dimensions are unknown — callers must render a
/// neutral fallback rather than a miscomputed position.
pub fn project(
    world: WorldPos,
    bounds: &WorldBounds,
    viewport: ViewportSize,
    padding: EdgePadding,
) -> Option<ScreenPos> {
    if !viewport.is_ready() {
        return None;
    }

    // Square content box, centered in the viewport.
    let (draw, off_x, off_y) = if viewport.width >= viewport.height {
        (viewport.height, (viewport.width - viewport.height) / 2.0, 0.0)
    } else {
        (viewport.width, 0.0, (viewport.height - viewport.width) / 2.0)
    };

    let u = (world.x - bounds.min_x) / (bounds.max_x - bounds.min_x);
    let v = (world.y - bounds.min_y) / (bounds.max_y - bounds.min_y);

    // World Y grows north, screen Y grows down.
    let v_img = 1.0 - v;

    let usable_w = draw - padding.left - padding.right;
    let usable_h = draw - padding.top - padding.bottom;

    Some(ScreenPos {
        x: off_x + padding.left + u * usable_w,
        y: off_y + padding.top + v_img * usable_h,
    })
}

/// The pan/zoom transform applied on top of projected positions.
///
/// Semantics match the map's render transform: scale about the viewport
/// center, then translate by the pan offset. Markers that must keep a
/// constant on-screen size compensate with [`marker_scale`](Self::marker_scale).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
}

impl ViewTransform {
    /// Build a transform, clamping zoom to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn new(zoom: f64, pan_x: f64, pan_y: f64) -> Self {
        Self {
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            pan_x,
            pan_y,
        }
    }

    /// Apply the transform to a projected position.
    pub fn apply(&self, viewport: ViewportSize, pos: ScreenPos) -> ScreenPos {
        let cx = viewport.width / 2.0;
        let cy = viewport.height / 2.0;
        ScreenPos {
            x: cx + (pos.x - cx) * self.zoom + self.pan_x,
            y: cy + (pos.y - cy) * self.zoom + self.pan_y,
        }
    }

    /// Inverse scale for fixed-size markers: a marker scaled by this factor
    /// keeps a constant screen size as the user zooms.
    pub fn marker_scale(&self) -> f64 {
        1.0 / self.zoom
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: WorldBounds = WorldBounds::DEFAULT;
    const NO_PADDING: EdgePadding = EdgePadding {
        left: 0.0,
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
    };

    #[test]
    fn north_west_corner_maps_to_content_top_left() {
        // Square viewport: content box is the whole viewport.
        let pos = project(
            WorldPos::new(-3000.0, 3000.0),
            &BOUNDS,
            ViewportSize::new(600.0, 600.0),
            NO_PADDING,
        )
        .unwrap();
        assert_eq!(pos, ScreenPos { x: 0.0, y: 0.0 });
    }

    #[test]
    fn south_east_corner_maps_to_content_bottom_right() {
        let pos = project(
            WorldPos::new(3000.0, -3000.0),
            &BOUNDS,
            ViewportSize::new(600.0, 600.0),
            NO_PADDING,
        )
        .unwrap();
        assert_eq!(pos, ScreenPos { x: 600.0, y: 600.0 });
    }

    #[test]
    fn wide_viewport_letterboxes_horizontally() {
        // 1000x600: content box is 600x600 offset 200px from the left.
        let pos = project(
            WorldPos::new(-3000.0, 3000.0),
            &BOUNDS,
            ViewportSize::new(1000.0, 600.0),
            NO_PADDING,
        )
        .unwrap();
        assert_eq!(pos, ScreenPos { x: 200.0, y: 0.0 });
    }

    #[test]
    fn tall_viewport_letterboxes_vertically() {
        // 600x1000: content box is 600x600 offset 200px from the top.
        let pos = project(
            WorldPos::new(3000.0, -3000.0),
            &BOUNDS,
            ViewportSize::new(600.0, 1000.0),
            NO_PADDING,
        )
        .unwrap();
        assert_eq!(pos, ScreenPos { x: 600.0, y: 800.0 });
    }

    #[test]
    fn world_origin_maps_to_content_center() {
        let pos = project(
            WorldPos::new(0.0, 0.0),
            &BOUNDS,
            ViewportSize::new(800.0, 600.0),
            NO_PADDING,
        )
        .unwrap();
        assert_eq!(pos, ScreenPos { x: 400.0, y: 300.0 });
    }

    #[test]
    fn unmeasured_viewport_is_not_ready() {
        let unready = project(
            WorldPos::new(0.0, 0.0),
            &BOUNDS,
            ViewportSize::new(0.0, 0.0),
            NO_PADDING,
        );
        assert!(unready.is_none());

        let half_ready = project(
            WorldPos::new(0.0, 0.0),
            &BOUNDS,
            ViewportSize::new(640.0, 0.0),
            NO_PADDING,
        );
        assert!(half_ready.is_none());
    }

    #[test]
    fn edge_padding_shrinks_the_usable_area() {
        let padding = EdgePadding {
            left: 10.0,
            top: 20.0,
            right: 30.0,
            bottom: 40.0,
        };
        let top_left = project(
            WorldPos::new(-3000.0, 3000.0),
            &BOUNDS,
            ViewportSize::new(600.0, 600.0),
            padding,
        )
        .unwrap();
        assert_eq!(top_left, ScreenPos { x: 10.0, y: 20.0 });

        let bottom_right = project(
            WorldPos::new(3000.0, -3000.0),
            &BOUNDS,
            ViewportSize::new(600.0, 600.0),
            padding,
        )
        .unwrap();
        // 600 - right/bottom padding.
        assert_eq!(bottom_right, ScreenPos { x: 570.0, y: 560.0 });
    }

    #[test]
    fn clamp_pulls_out_of_range_positions_to_the_edge() {
        let clamped = BOUNDS.clamp(WorldPos::new(9999.0, -9999.0));
        assert_eq!(clamped, WorldPos::new(3000.0, -3000.0));
    }

    #[test]
    fn identity_transform_leaves_positions_unchanged() {
        let viewport = ViewportSize::new(800.0, 600.0);
        let pos = ScreenPos { x: 123.0, y: 456.0 };
        assert_eq!(ViewTransform::default().apply(viewport, pos), pos);
    }

    #[test]
    fn zoom_scales_about_the_viewport_center() {
        let viewport = ViewportSize::new(800.0, 600.0);
        let transform = ViewTransform::new(2.0, 0.0, 0.0);

        // The center is a fixed point.
        let center = ScreenPos { x: 400.0, y: 300.0 };
        assert_eq!(transform.apply(viewport, center), center);

        // Other points move away from the center.
        let moved = transform.apply(viewport, ScreenPos { x: 500.0, y: 300.0 });
        assert_eq!(moved, ScreenPos { x: 600.0, y: 300.0 });
    }

    #[test]
    fn pan_translates_after_scaling() {
        let viewport = ViewportSize::new(800.0, 600.0);
        let transform = ViewTransform::new(2.0, 50.0, -25.0);
        let moved = transform.apply(viewport, ScreenPos { x: 400.0, y: 300.0 });
        assert_eq!(moved, ScreenPos { x: 450.0, y: 275.0 });
    }

    #[test]
    fn zoom_is_clamped_to_the_allowed_range() {
        assert_eq!(ViewTransform::new(0.1, 0.0, 0.0).zoom, MIN_ZOOM);
        assert_eq!(ViewTransform::new(50.0, 0.0, 0.0).zoom, MAX_ZOOM);
    }

    #[test]
    fn marker_scale_is_the_zoom_inverse() {
        assert_eq!(ViewTransform::new(4.0, 0.0, 0.0).marker_scale(), 0.25);
    }
}
