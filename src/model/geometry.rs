//! Axis-aligned boxes and affine matrices in PDF user space.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle, `(x, y)` bottom-left and `(x2, y2)` top-right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    /// Create a rectangle from its corners.
    pub fn new(x: f32, y: f32, x2: f32, y2: f32) -> Self {
        Self { x, y, x2, y2 }
    }

    /// Create a rectangle from two arbitrary corners, normalizing the order.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            x2: x0.max(x1),
            y2: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y
    }

    /// Center point.
    pub fn center(&self) -> (f32, f32) {
        ((self.x + self.x2) / 2.0, (self.y + self.y2) / 2.0)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x: self.x.min(other.x),
            y: self.y.min(other.y),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Union of all rectangles, `None` for an empty iterator.
    pub fn union_all<'a, I>(rects: I) -> Option<Rect>
    where
        I: IntoIterator<Item = &'a Rect>,
    {
        rects
            .into_iter()
            .fold(None, |acc: Option<Rect>, r| match acc {
                Some(a) => Some(a.union(r)),
                None => Some(*r),
            })
    }

    /// Whether the point lies inside or on the border.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        self.x <= x && x <= self.x2 && self.y <= y && y <= self.y2
    }

    /// Whether the two rectangles overlap with a positive area.
    pub fn overlaps(&self, other: &Rect) -> bool {
        !(self.x2 <= other.x || other.x2 <= self.x || self.y2 <= other.y || other.y2 <= self.y)
    }

    /// Whether the vertical ranges intersect (touching counts).
    pub fn y_intersects(&self, other: &Rect) -> bool {
        self.y <= other.y2 && other.y <= self.y2
    }

    /// Whether one horizontal range fully contains the other.
    pub fn x_nested(&self, other: &Rect) -> bool {
        (self.x <= other.x && other.x2 <= self.x2) || (other.x <= self.x && self.x2 <= other.x2)
    }

    /// Translate by `(dx, dy)`.
    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect {
            x: self.x + dx,
            y: self.y + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }

    /// Transform both corners by `m` and return the normalized result.
    pub fn transform(&self, m: &Matrix) -> Rect {
        let (x0, y0) = m.apply(self.x, self.y);
        let (x1, y1) = m.apply(self.x2, self.y2);
        Rect::from_corners(x0, y0, x1, y1)
    }
}

/// A PDF affine transformation `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Apply to a point.
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Inverse transform, `None` when singular.
    pub fn invert(&self) -> Option<Matrix> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Matrix {
            a,
            b,
            c,
            d,
            e: -(self.e * a + self.f * c),
            f: -(self.e * b + self.f * d),
        })
    }

    pub fn to_array(&self) -> [f32; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_union_and_contains() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, -5.0, 20.0, 5.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, -5.0, 20.0, 10.0));
        assert!(u.contains_point(20.0, 10.0));
        assert!(!a.contains_point(11.0, 1.0));
    }

    #[test]
    fn test_x_nested() {
        let outer = Rect::new(0.0, 0.0, 10.0, 1.0);
        let inner = Rect::new(2.0, 5.0, 3.0, 6.0);
        assert!(outer.x_nested(&inner));
        assert!(inner.x_nested(&outer));
        assert!(!outer.y_intersects(&inner));
    }

    #[test]
    fn test_matrix_inverse() {
        let m = Matrix::new(2.0, 0.0, 0.0, 4.0, 10.0, 20.0);
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(3.0, 5.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 3.0).abs() < 1e-4);
        assert!((by - 5.0).abs() < 1e-4);
        assert!(Matrix::new(0.0, 0.0, 0.0, 0.0, 1.0, 1.0).invert().is_none());
    }

    #[test]
    fn test_matrix_multiply_order() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translate(10.0, 0.0);
        // scale first, then shift
        let m = scale.multiply(&shift);
        assert_eq!(m.apply(1.0, 1.0), (12.0, 2.0));
    }
}
