//! Rectangle geometry and scissor clipping.
//!
//! All GUI drawing goes through [`clip_draw_call`] so that a child's quads
//! never escape its ancestor's viewport. Rectangles are integer pixels in
//! whatever space the caller is working in (parent-local or absolute).

/// Integer pixel position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Integer pixel rectangle. Width/height are never negative in a valid tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const EMPTY: Self = Self {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    };

    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Returns true if the point (px, py) is inside this rectangle.
    /// Right and bottom edges are exclusive.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Returns true if `other` lies entirely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Returns true if the two rectangles overlap by at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Intersection of two rectangles, or `Rect::EMPTY` if disjoint.
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return Rect::EMPTY;
        }
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Same rectangle translated by (dx, dy).
    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// A source/destination rectangle pair for one textured quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuiRect {
    /// Region on the source texture.
    pub source: Rect,
    /// Region on the destination target.
    pub dest: Rect,
}

/// Clip one draw call against an ancestor scissor rectangle.
///
/// Returns `None` when the destination is fully outside the scissor (the
/// quad is culled). Otherwise returns the adjusted pair. For 1:1 blits
/// (source and destination extents equal on an axis) the source is trimmed
/// and shifted in step with the destination, so the surviving texels map
/// unchanged. For stretched blits only the destination shrinks; the full
/// source region is still sampled, slightly over-fetching at the cut edge.
/// That is the behavior every stretched skin was authored against, so it is
/// kept rather than corrected.
///
/// Each axis can only overflow one side of the scissor at a time, since the
/// scissor is the single ancestor viewport and the destination is
/// non-degenerate; left/right and top/bottom are therefore checked as
/// exclusive pairs.
pub fn clip_draw_call(source: Rect, dest: Rect, scissor: Rect) -> Option<GuiRect> {
    if scissor.contains_rect(&dest) {
        return Some(GuiRect { source, dest });
    }
    if !scissor.intersects(&dest) {
        return None;
    }

    let mut source = source;
    let mut dest = dest;

    if dest.x < scissor.x {
        let dif = scissor.x - dest.x;
        if dest.width == source.width {
            source.width -= dif;
            source.x += dif;
        }
        dest.width -= dif;
        dest.x += dif;
    } else if dest.right() > scissor.right() {
        let dif = dest.right() - scissor.right();
        if dest.width == source.width {
            source.width -= dif;
        }
        dest.width -= dif;
    }

    if dest.y < scissor.y {
        let dif = scissor.y - dest.y;
        if dest.height == source.height {
            source.height -= dif;
            source.y += dif;
        }
        dest.height -= dif;
        dest.y += dif;
    } else if dest.bottom() > scissor.bottom() {
        let dif = dest.bottom() - scissor.bottom();
        if dest.height == source.height {
            source.height -= dif;
        }
        dest.height -= dif;
    }

    Some(GuiRect { source, dest })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_contains_point() {
        let r = Rect::new(10, 20, 100, 50);
        assert!(r.contains(10, 20)); // top-left corner
        assert!(r.contains(50, 40)); // center
        assert!(r.contains(109, 69)); // last pixel
        assert!(!r.contains(110, 70)); // exactly at edge (exclusive)
        assert!(!r.contains(9, 20)); // just outside left
    }

    #[test]
    fn rect_intersection() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 50, 100, 100);
        assert_eq!(a.intersection(&b), Rect::new(50, 50, 50, 50));

        let disjoint = Rect::new(200, 200, 10, 10);
        assert!(a.intersection(&disjoint).is_empty());
        assert!(!a.intersects(&disjoint));

        // Touching edges do not intersect.
        let touching = Rect::new(100, 0, 10, 10);
        assert!(!a.intersects(&touching));
    }

    #[test]
    fn fully_inside_is_unchanged() {
        let source = Rect::new(5, 5, 50, 20);
        let dest = Rect::new(10, 10, 50, 20);
        let scissor = Rect::new(0, 0, 100, 100);

        let out = clip_draw_call(source, dest, scissor).expect("visible");
        assert_eq!(out.source, source);
        assert_eq!(out.dest, dest);
    }

    #[test]
    fn fully_outside_is_culled() {
        let source = Rect::new(0, 0, 10, 10);
        let dest = Rect::new(200, 200, 10, 10);
        let scissor = Rect::new(0, 0, 100, 100);
        assert!(clip_draw_call(source, dest, scissor).is_none());
    }

    #[test]
    fn unscaled_blit_trims_source_and_dest_on_left() {
        // Destination sticks 4px out of the scissor's left edge.
        let source = Rect::new(0, 0, 20, 10);
        let dest = Rect::new(-4, 0, 20, 10);
        let scissor = Rect::new(0, 0, 100, 100);

        let out = clip_draw_call(source, dest, scissor).expect("visible");
        assert_eq!(out.dest, Rect::new(0, 0, 16, 10));
        // Source shifted and shrunk by the same 4px.
        assert_eq!(out.source, Rect::new(4, 0, 16, 10));
    }

    #[test]
    fn unscaled_blit_trims_right_without_shift() {
        let source = Rect::new(0, 0, 20, 10);
        let dest = Rect::new(90, 0, 20, 10);
        let scissor = Rect::new(0, 0, 100, 100);

        let out = clip_draw_call(source, dest, scissor).expect("visible");
        assert_eq!(out.dest, Rect::new(90, 0, 10, 10));
        assert_eq!(out.source, Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn unscaled_blit_trims_top_and_bottom() {
        let scissor = Rect::new(0, 0, 100, 100);

        let top = clip_draw_call(Rect::new(0, 0, 10, 20), Rect::new(0, -5, 10, 20), scissor)
            .expect("visible");
        assert_eq!(top.dest, Rect::new(0, 0, 10, 15));
        assert_eq!(top.source, Rect::new(0, 5, 10, 15));

        let bottom = clip_draw_call(Rect::new(0, 0, 10, 20), Rect::new(0, 90, 10, 20), scissor)
            .expect("visible");
        assert_eq!(bottom.dest, Rect::new(0, 90, 10, 10));
        assert_eq!(bottom.source, Rect::new(0, 0, 10, 10));
    }

    #[test]
    fn stretched_blit_shrinks_dest_only() {
        // 10px source stretched into a 50px destination, overflowing right.
        let source = Rect::new(0, 0, 10, 10);
        let dest = Rect::new(80, 0, 50, 10);
        let scissor = Rect::new(0, 0, 100, 100);

        let out = clip_draw_call(source, dest, scissor).expect("visible");
        assert_eq!(out.dest, Rect::new(80, 0, 20, 10));
        // Source untouched: the stretched image over-fetches at the cut.
        assert_eq!(out.source, source);
    }

    #[test]
    fn corner_overlap_trims_both_axes() {
        let source = Rect::new(0, 0, 20, 20);
        let dest = Rect::new(-5, -7, 20, 20);
        let scissor = Rect::new(0, 0, 100, 100);

        let out = clip_draw_call(source, dest, scissor).expect("visible");
        assert_eq!(out.dest, Rect::new(0, 0, 15, 13));
        assert_eq!(out.source, Rect::new(5, 7, 15, 13));
    }
}
