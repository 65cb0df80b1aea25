use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Fit this frame inside `bounds`: shrink any dimension larger than the
    /// bounds, then slide the origin so no edge leaves the visible area.
    #[must_use]
    pub fn fit_within(&self, bounds: &Rect) -> Rect {
        let width = self.width.min(bounds.width).max(0.0);
        let height = self.height.min(bounds.height).max(0.0);
        let x = self.x.min(bounds.max_x() - width).max(bounds.x);
        let y = self.y.min(bounds.max_y() - height).max(bounds.y);
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCREEN: Rect = Rect::new(0.0, 25.0, 1440.0, 875.0);

    #[test]
    fn frame_inside_screen_is_unchanged() {
        let frame = Rect::new(100.0, 100.0, 800.0, 600.0);
        assert_eq!(frame.fit_within(&SCREEN), frame);
    }

    #[test]
    fn frame_past_right_edge_slides_left() {
        let frame = Rect::new(1000.0, 100.0, 800.0, 600.0);
        let fitted = frame.fit_within(&SCREEN);
        assert_eq!(fitted, Rect::new(640.0, 100.0, 800.0, 600.0));
    }

    #[test]
    fn frame_above_origin_slides_into_view() {
        let frame = Rect::new(-50.0, 0.0, 400.0, 300.0);
        let fitted = frame.fit_within(&SCREEN);
        assert_eq!(fitted, Rect::new(0.0, 25.0, 400.0, 300.0));
    }

    #[test]
    fn oversized_frame_shrinks_to_screen() {
        let frame = Rect::new(-200.0, -200.0, 3000.0, 2000.0);
        let fitted = frame.fit_within(&SCREEN);
        assert_eq!(fitted, SCREEN);
        assert!(SCREEN.contains(&fitted));
    }
}
