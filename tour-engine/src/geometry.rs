// Screen geometry for tour overlays
//
// All values are density-independent points in window coordinates (origin top-left), the same
// space the host's layout system reports from `measure_in_window`.

use serde::{Deserialize, Serialize};

/// Raw rectangle as reported by a measurable target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindowRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl WindowRect {
    pub const ZERO: WindowRect = WindowRect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Layout has settled once both dimensions are positive.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Highlight rectangle used by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
    pub corner_radius: f64,
}

impl Rect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
            corner_radius: 0.0,
        }
    }

    /// Convert a measured window rect, shifting it down by a fixed top inset.
    pub fn from_window(raw: WindowRect, top_inset: f64) -> Self {
        Self::new(raw.y + top_inset, raw.x, raw.width, raw.height)
    }

    pub fn with_corner_radius(mut self, radius: f64) -> Self {
        self.corner_radius = radius;
        self
    }

    /// Grow the rectangle on every side.
    pub fn inflate(mut self, padding: f64) -> Self {
        self.top -= padding;
        self.left -= padding;
        self.width += padding * 2.0;
        self.height += padding * 2.0;
        self
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }
}

/// Visible window area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Compute the cells of a uniform grid from its container and one measured child.
///
/// Only one child in a repeating layout usually exposes a measurement handle; the rest are
/// derived arithmetically. Cell width is `(container.width - gap * (columns - 1)) / columns`,
/// cell height is the reference child's height, and rows start at the reference child's top.
/// Cells are returned in row-major order.
pub fn derive_grid(
    container: Rect,
    reference: Rect,
    columns: usize,
    gap: f64,
    count: usize,
) -> Vec<Rect> {
    if columns == 0 || count == 0 {
        return Vec::new();
    }

    let cols = columns as f64;
    let cell_width = ((container.width - gap * (cols - 1.0)) / cols).max(0.0);
    let cell_height = reference.height;

    (0..count)
        .map(|index| {
            let row = (index / columns) as f64;
            let col = (index % columns) as f64;
            Rect {
                top: reference.top + row * (cell_height + gap),
                left: container.left + col * (cell_width + gap),
                width: cell_width,
                height: cell_height,
                corner_radius: reference.corner_radius,
            }
        })
        .collect()
}
