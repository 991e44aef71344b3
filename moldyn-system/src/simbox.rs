/// Orthogonal periodic simulation box together with the sub-box owned by one rank.
///
/// The global box spans `[0, xprd) x [0, yprd) x [0, zprd)`; sub-boxes of all
/// ranks tile it exactly and periodicity applies at the global faces only.
/// A freshly created box owns the whole domain; the communication setup
/// narrows the sub-box once the process grid is known.
#[derive(Clone, Debug)]
pub struct SimBox {
    pub xprd: f64,
    pub yprd: f64,
    pub zprd: f64,
    pub xlo: f64,
    pub xhi: f64,
    pub ylo: f64,
    pub yhi: f64,
    pub zlo: f64,
    pub zhi: f64,
}

impl SimBox {
    pub fn new(xprd: f64, yprd: f64, zprd: f64) -> SimBox {
        SimBox {
            xprd,
            yprd,
            zprd,
            xlo: 0.0,
            xhi: xprd,
            ylo: 0.0,
            yhi: yprd,
            zlo: 0.0,
            zhi: zprd,
        }
    }

    /// Global box length along a given dimension (0, 1 or 2)
    #[inline(always)]
    pub fn prd(&self, dim: usize) -> f64 {
        match dim {
            0 => self.xprd,
            1 => self.yprd,
            _ => self.zprd,
        }
    }

    /// Lower sub-box bound along a given dimension
    #[inline(always)]
    pub fn lo(&self, dim: usize) -> f64 {
        match dim {
            0 => self.xlo,
            1 => self.ylo,
            _ => self.zlo,
        }
    }

    /// Upper sub-box bound along a given dimension
    #[inline(always)]
    pub fn hi(&self, dim: usize) -> f64 {
        match dim {
            0 => self.xhi,
            1 => self.yhi,
            _ => self.zhi,
        }
    }

    /// Assigns the sub-box bounds along a given dimension
    pub fn set_bounds(&mut self, dim: usize, lo: f64, hi: f64) {
        match dim {
            0 => {
                self.xlo = lo;
                self.xhi = hi;
            }
            1 => {
                self.ylo = lo;
                self.yhi = hi;
            }
            _ => {
                self.zlo = lo;
                self.zhi = hi;
            }
        }
    }

    /// Volume of the global simulation box
    pub fn volume(&self) -> f64 {
        self.xprd * self.yprd * self.zprd
    }

    /// Wraps a coordinate into the `[0, prd)` range of a given dimension.
    ///
    /// `rem_euclid` can land exactly on the box length when a tiny negative
    /// value rounds up, so the result is folded once more.
    #[inline(always)]
    pub fn wrap(&self, value: f64, dim: usize) -> f64 {
        let l = self.prd(dim);
        let mut wrapped = value.rem_euclid(l);
        if wrapped >= l {
            wrapped -= l;
        }
        wrapped
    }

    /// Calculates the shortest difference `c1 - c2` along a given dimension.
    ///
    /// The returned value is evaluated against the closest periodic image;
    /// both inputs must already lie inside the global box.
    #[inline(always)]
    pub fn min_image(&self, c1: f64, c2: f64, dim: usize) -> f64 {
        let l = self.prd(dim);
        let mut d = c1 - c2;
        if d > 0.5 * l {
            d -= l;
        } else if d < -0.5 * l {
            d += l;
        }
        d
    }

    /// Squared minimum-image distance between two points
    pub fn min_image_distance_square(&self, a: &[f64], b: &[f64]) -> f64 {
        let mut d2 = 0.0;
        for dim in 0..3 {
            let d = self.min_image(a[dim], b[dim], dim);
            d2 += d * d;
        }
        d2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    #[test]
    fn wrap_coordinate_test() {
        let b = SimBox::new(10.0, 10.0, 10.0);
        assert_close!(b.wrap(10.5, 0), 0.5, 1e-12);
        assert_close!(b.wrap(-0.5, 1), 9.5, 1e-12);
        assert_close!(b.wrap(3.25, 2), 3.25, 1e-12);
        assert_close!(b.wrap(10.0, 0), 0.0, 1e-12);
        // a tiny negative value must fold to 0, not to the box length
        assert_eq!(b.wrap(-1.0e-17, 0), 0.0);
    }

    #[test]
    fn min_image_test() {
        let b = SimBox::new(10.0, 20.0, 30.0);
        assert_close!(b.min_image(9.5, 0.5, 0), -1.0, 1e-12);
        assert_close!(b.min_image(0.5, 9.5, 0), 1.0, 1e-12);
        assert_close!(b.min_image(4.0, 1.0, 1), 3.0, 1e-12);
        let a = [9.9, 0.0, 0.0];
        let c = [0.1, 0.0, 0.0];
        assert_close!(b.min_image_distance_square(&a, &c), 0.04, 1e-12);
    }
}
