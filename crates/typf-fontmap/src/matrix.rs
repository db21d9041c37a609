//! Affine matrices used for font and device transforms
//!
//! Points map as `x' = xx*x + xy*y + x0`, `y' = yx*x + yy*y + y0`.

/// A 2D affine transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub xx: f64,
    pub yx: f64,
    pub xy: f64,
    pub yy: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(xx: f64, yx: f64, xy: f64, yy: f64, x0: f64, y0: f64) -> Self {
        Self {
            xx,
            yx,
            xy,
            yy,
            x0,
            y0,
        }
    }

    /// Uniform or anisotropic scale, the usual font matrix
    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn determinant(&self) -> f64 {
        self.xx * self.yy - self.yx * self.xy
    }

    pub fn is_finite(&self) -> bool {
        [self.xx, self.yx, self.xy, self.yy, self.x0, self.y0]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Apply `self` first, then `other`
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        let (a, b) = (self, other);
        Matrix {
            xx: a.xx * b.xx + a.yx * b.xy,
            yx: a.xx * b.yx + a.yx * b.yy,
            xy: a.xy * b.xx + a.yy * b.xy,
            yy: a.xy * b.yx + a.yy * b.yy,
            x0: a.x0 * b.xx + a.y0 * b.xy + b.x0,
            y0: a.x0 * b.yx + a.y0 * b.yy + b.y0,
        }
    }

    /// Inverse transform, `None` when the matrix is singular
    pub fn invert(&self) -> Option<Matrix> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        Some(Matrix {
            xx: self.yy / det,
            yx: -self.yx / det,
            xy: -self.xy / det,
            yy: self.xx / det,
            x0: (self.xy * self.y0 - self.yy * self.x0) / det,
            y0: (self.yx * self.x0 - self.xx * self.y0) / det,
        })
    }

    /// Same linear part, translation zeroed
    pub fn without_translation(&self) -> Matrix {
        Matrix {
            x0: 0.0,
            y0: 0.0,
            ..*self
        }
    }

    /// All four linear coefficients are zero (a font size of 0)
    pub fn is_scale_0(&self) -> bool {
        self.xx == 0.0 && self.yx == 0.0 && self.xy == 0.0 && self.yy == 0.0
    }

    pub fn transform_distance(&self, dx: f64, dy: f64) -> (f64, f64) {
        (
            self.xx * dx + self.xy * dy,
            self.yx * dx + self.yy * dy,
        )
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = self.transform_distance(x, y);
        (dx + self.x0, dy + self.y0)
    }

    /// Scale along the chosen basis vector and normal to it
    ///
    /// Returns `(basis, normal)`; `x_major` picks the x axis as the basis.
    pub fn basis_scale_factors(&self, x_major: bool) -> (f64, f64) {
        let det = self.determinant();
        if det == 0.0 {
            return (0.0, 0.0);
        }

        let (x, y) = if x_major {
            self.transform_distance(1.0, 0.0)
        } else {
            self.transform_distance(0.0, 1.0)
        };
        let major = x.hypot(y);
        let minor = if major != 0.0 { det.abs() / major } else { 0.0 };

        if x_major {
            (major, minor)
        } else {
            (minor, major)
        }
    }

    /// Bit patterns for hashing, with `-0.0` folded into `0.0`
    pub fn identity_bits(&self) -> [u64; 6] {
        [self.xx, self.yx, self.xy, self.yy, self.x0, self.y0].map(|v| (v + 0.0).to_bits())
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Matrix> for kurbo::Affine {
    fn from(m: Matrix) -> Self {
        kurbo::Affine::new([m.xx, m.yx, m.xy, m.yy, m.x0, m.y0])
    }
}
