//! Binned neighbor lists.
//!
//! Local and ghost atoms are hashed into a 3-d grid of bins aligned with the
//! global box and padded by a ghost margin; for every owned atom the bins of a
//! precomputed stencil are scanned and partners within the neighbor cutoff are
//! recorded into a flat row-major list. Lists survive several steps: the
//! integrator decides when a rebuild is due, this crate only builds.

use rayon::prelude::*;

use moldyn_system::{Atom, PAD};

const SMALL: f64 = 1.0e-6;
const FACTOR: f64 = 0.999;

/// Neighbor list of one rank.
///
/// Rows are stored in a flat buffer: the partners of atom `i` live at
/// `neighbors[i * maxneighs ..][..numneigh[i]]`. That layout, including the
/// `maxneighs` stride, is part of the contract with the force kernels.
///
/// Three inclusion policies exist:
/// * full list: every partner within the cutoff is recorded;
/// * half list with ghost-Newton: a pair is recorded by exactly one of its
///   two sides, using index order for local pairs and (z, y, x) lexicographic
///   coordinate order against ghosts, so ghost images of the same pair on two
///   ranks resolve consistently;
/// * half list without ghost-Newton: index order among locals, and every
///   local-ghost pair is kept by the local side on both ranks.
pub struct Neighbor {
    pub cutneigh: f64,
    cutneighsq: f64,
    /// rebuild cadence in steps
    pub every: usize,
    pub halfneigh: bool,
    pub ghost_newton: bool,
    pub nbinx: usize,
    pub nbiny: usize,
    pub nbinz: usize,
    prd: [f64; 3],
    binsize: [f64; 3],
    bininv: [f64; 3],
    mbinlo: [i64; 3],
    mbin: [usize; 3],
    stencil: Vec<i64>,
    bins: Vec<Vec<usize>>,
    pub numneigh: Vec<usize>,
    pub neighbors: Vec<usize>,
    pub maxneighs: usize,
    pub ncalls: usize,
}

impl Neighbor {
    pub fn new(
        cutneigh: f64,
        every: usize,
        nbinx: usize,
        nbiny: usize,
        nbinz: usize,
        halfneigh: bool,
        ghost_newton: bool,
    ) -> Neighbor {
        Neighbor {
            cutneigh,
            cutneighsq: cutneigh * cutneigh,
            every,
            halfneigh,
            ghost_newton,
            nbinx: nbinx.max(1),
            nbiny: nbiny.max(1),
            nbinz: nbinz.max(1),
            prd: [0.0; 3],
            binsize: [0.0; 3],
            bininv: [0.0; 3],
            mbinlo: [0; 3],
            mbin: [0; 3],
            stencil: Vec::new(),
            bins: Vec::new(),
            numneigh: Vec::new(),
            neighbors: Vec::new(),
            maxneighs: 100,
            ncalls: 0,
        }
    }

    /// Row of neighbors recorded for atom `i`
    #[inline(always)]
    pub fn row(&self, i: usize) -> &[usize] {
        &self.neighbors[i * self.maxneighs..i * self.maxneighs + self.numneigh[i]]
    }

    /// Sizes the bin grid to the sub-box of this rank plus a ghost margin of
    /// one cutoff on every side, and precomputes the bin stencil.
    ///
    /// Must be called after the sub-box bounds are final and again whenever
    /// they change.
    pub fn setup(&mut self, atom: &Atom) {
        self.cutneighsq = self.cutneigh * self.cutneigh;
        self.prd = [atom.simbox.xprd, atom.simbox.yprd, atom.simbox.zprd];
        let nbin = [self.nbinx, self.nbiny, self.nbinz];

        let mut next = [0i64; 3];
        for dim in 0..3 {
            self.binsize[dim] = self.prd[dim] / nbin[dim] as f64;
            self.bininv[dim] = 1.0 / self.binsize[dim];

            let mut coord = atom.simbox.lo(dim) - self.cutneigh - SMALL * self.prd[dim];
            let mut lo = (coord * self.bininv[dim]) as i64;
            if coord < 0.0 {
                lo -= 1;
            }
            coord = atom.simbox.hi(dim) + self.cutneigh + SMALL * self.prd[dim];
            let hi = (coord * self.bininv[dim]) as i64;

            self.mbinlo[dim] = lo - 1;
            self.mbin[dim] = (hi + 1 - self.mbinlo[dim] + 1) as usize;

            next[dim] = (self.cutneigh * self.bininv[dim]) as i64;
            if next[dim] as f64 * self.binsize[dim] < FACTOR * self.cutneigh {
                next[dim] += 1;
            }
        }

        // ---------- stencil: every bin offset whose closest approach to the
        // center bin is within the cutoff
        self.stencil.clear();
        for k in -next[2]..=next[2] {
            for j in -next[1]..=next[1] {
                for i in -next[0]..=next[0] {
                    if self.bindist(i, j, k) < self.cutneighsq {
                        self.stencil
                            .push((k * self.mbin[1] as i64 + j) * self.mbin[0] as i64 + i);
                    }
                }
            }
        }

        let mbins = self.mbin[0] * self.mbin[1] * self.mbin[2];
        self.bins = vec![Vec::new(); mbins];
    }

    /// Builds the neighbor list for every owned atom.
    ///
    /// When any row outgrows `maxneighs`, the stride grows by at least 1/5
    /// and the build restarts.
    pub fn build(&mut self, atom: &Atom) {
        self.ncalls += 1;
        let nlocal = atom.nlocal;

        // ---------- bin owned and ghost atoms alike
        for bin in self.bins.iter_mut() {
            bin.clear();
        }
        for i in 0..atom.nall() {
            let bin = self.coord2bin(
                atom.x[i * PAD],
                atom.x[i * PAD + 1],
                atom.x[i * PAD + 2],
            );
            self.bins[bin].push(i);
        }

        loop {
            let maxneighs = self.maxneighs;
            let mut neighbors = std::mem::take(&mut self.neighbors);
            neighbors.resize(nlocal * maxneighs, 0);

            let counts: Vec<usize> = neighbors
                .par_chunks_mut(maxneighs)
                .enumerate()
                .map(|(i, row)| self.walk_stencil(i, row, atom))
                .collect();
            self.neighbors = neighbors;

            let widest = counts.iter().copied().max().unwrap_or(0);
            if widest <= maxneighs {
                self.numneigh = counts;
                return;
            }
            self.maxneighs = widest * 6 / 5;
        }
    }

    /// Scans the stencil bins around atom `i`, applying the half/full
    /// inclusion rule; returns the number of partners found (which may exceed
    /// the row capacity, signalling a rebuild)
    fn walk_stencil(&self, i: usize, row: &mut [usize], atom: &Atom) -> usize {
        let x = &atom.x;
        let nlocal = atom.nlocal;
        let xtmp = x[i * PAD];
        let ytmp = x[i * PAD + 1];
        let ztmp = x[i * PAD + 2];
        let ibin = self.coord2bin(xtmp, ytmp, ztmp) as i64;
        let maxneighs = row.len();

        let mut n = 0;
        for &offset in &self.stencil {
            for &j in &self.bins[(ibin + offset) as usize] {
                if j == i {
                    continue;
                }
                if self.halfneigh {
                    if !self.ghost_newton && j < i {
                        continue;
                    }
                    if self.ghost_newton {
                        if j < i {
                            continue;
                        }
                        // ghosts behind this atom in (z, y, x) order belong
                        // to the other side of the pair
                        if j >= nlocal {
                            let zj = x[j * PAD + 2];
                            let yj = x[j * PAD + 1];
                            let xj = x[j * PAD];
                            if zj < ztmp
                                || (zj == ztmp && yj < ytmp)
                                || (zj == ztmp && yj == ytmp && xj < xtmp)
                            {
                                continue;
                            }
                        }
                    }
                }

                let delx = xtmp - x[j * PAD];
                let dely = ytmp - x[j * PAD + 1];
                let delz = ztmp - x[j * PAD + 2];
                let rsq = delx * delx + dely * dely + delz * delz;
                if rsq < self.cutneighsq {
                    if n < maxneighs {
                        row[n] = j;
                    }
                    n += 1;
                }
            }
        }
        n
    }

    /// Permutes the owned atoms into bin order to restore spatial locality.
    ///
    /// Physics is untouched; only storage indices change. Ghosts are left to
    /// the next border pass.
    pub fn sort(&self, atom: &mut Atom) {
        let mut order: Vec<usize> = (0..atom.nlocal).collect();
        order.sort_by_key(|&i| {
            self.coord2bin(
                atom.x[i * PAD],
                atom.x[i * PAD + 1],
                atom.x[i * PAD + 2],
            )
        });
        atom.permute(&order);
    }

    /// Squared closest approach between the home bin and the bin displaced by
    /// `(i, j, k)` bins
    fn bindist(&self, i: i64, j: i64, k: i64) -> f64 {
        let del = |n: i64, size: f64| {
            if n > 0 {
                (n - 1) as f64 * size
            } else if n == 0 {
                0.0
            } else {
                (n + 1) as f64 * size
            }
        };
        let dx = del(i, self.binsize[0]);
        let dy = del(j, self.binsize[1]);
        let dz = del(k, self.binsize[2]);
        dx * dx + dy * dy + dz * dz
    }

    fn bin1d(&self, c: f64, dim: usize) -> i64 {
        let nbin = [self.nbinx, self.nbiny, self.nbinz][dim];
        if c >= self.prd[dim] {
            ((c - self.prd[dim]) * self.bininv[dim]) as i64 + nbin as i64
        } else if c >= 0.0 {
            (c * self.bininv[dim]) as i64
        } else {
            (c * self.bininv[dim]) as i64 - 1
        }
    }

    /// Bin index of a coordinate triple; valid for ghost coordinates beyond
    /// the global box as well
    fn coord2bin(&self, x: f64, y: f64, z: f64) -> usize {
        let cs = [x, y, z];
        let mut idx = [0usize; 3];
        for dim in 0..3 {
            let local = self.bin1d(cs[dim], dim) - self.mbinlo[dim];
            idx[dim] = local.clamp(0, self.mbin[dim] as i64 - 1) as usize;
        }
        (idx[2] * self.mbin[1] + idx[1]) * self.mbin[0] + idx[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moldyn_system::SimBox;

    /// 27 atoms on a loose grid, all owned by a single whole-box rank
    fn grid_atoms() -> Atom {
        let mut atom = Atom::new(SimBox::new(12.0, 12.0, 12.0));
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    atom.add_atom(
                        1.0 + 3.3 * i as f64,
                        1.3 + 3.1 * j as f64,
                        0.9 + 3.4 * k as f64,
                        0.0,
                        0.0,
                        0.0,
                        0,
                    );
                }
            }
        }
        atom
    }

    fn brute_force_pairs(atom: &Atom, cutoff: f64) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..atom.nlocal {
            for j in 0..i {
                let mut d2 = 0.0;
                for d in 0..3 {
                    let del = atom.x[i * PAD + d] - atom.x[j * PAD + d];
                    d2 += del * del;
                }
                if d2 < cutoff * cutoff {
                    pairs.push((j, i));
                }
            }
        }
        pairs
    }

    #[test]
    fn full_list_complete_test() {
        let atom = grid_atoms();
        let mut neighbor = Neighbor::new(3.6, 20, 10, 10, 10, false, false);
        neighbor.setup(&atom);
        neighbor.build(&atom);

        let pairs = brute_force_pairs(&atom, 3.6);
        let total: usize = (0..atom.nlocal).map(|i| neighbor.numneigh[i]).sum();
        assert_eq!(total, 2 * pairs.len());
        for &(j, i) in &pairs {
            assert!(neighbor.row(i).contains(&j));
            assert!(neighbor.row(j).contains(&i));
        }
    }

    #[test]
    fn half_list_records_each_pair_once_test() {
        let atom = grid_atoms();
        for ghost_newton in [false, true] {
            let mut neighbor = Neighbor::new(3.6, 20, 10, 10, 10, true, ghost_newton);
            neighbor.setup(&atom);
            neighbor.build(&atom);

            let pairs = brute_force_pairs(&atom, 3.6);
            let total: usize = (0..atom.nlocal).map(|i| neighbor.numneigh[i]).sum();
            assert_eq!(total, pairs.len());
            for &(j, i) in &pairs {
                assert!(neighbor.row(j).contains(&i));
                assert!(!neighbor.row(i).contains(&j));
            }
        }
    }

    #[test]
    fn ghost_newton_tiebreak_test() {
        // one owned atom plus ghosts ahead and behind in z
        let mut atom = Atom::new(SimBox::new(12.0, 12.0, 12.0));
        atom.add_atom(6.0, 6.0, 6.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(6.0, 6.0, 7.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(6.0, 6.0, 5.0, 0.0, 0.0, 0.0, 0);
        atom.nlocal = 1;
        atom.nghost = 2;

        let mut neighbor = Neighbor::new(2.0, 20, 8, 8, 8, true, true);
        neighbor.setup(&atom);
        neighbor.build(&atom);

        // only the ghost ahead in z is recorded on this side
        assert_eq!(neighbor.numneigh[0], 1);
        assert_eq!(neighbor.row(0), &[1]);
    }

    #[test]
    fn cutoff_is_strict_test() {
        let mut atom = Atom::new(SimBox::new(12.0, 12.0, 12.0));
        atom.add_atom(3.0, 3.0, 3.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(5.5, 3.0, 3.0, 0.0, 0.0, 0.0, 0);
        let mut neighbor = Neighbor::new(2.5, 20, 6, 6, 6, false, false);
        neighbor.setup(&atom);
        neighbor.build(&atom);
        assert_eq!(neighbor.numneigh[0], 0);
        assert_eq!(neighbor.numneigh[1], 0);
    }

    #[test]
    fn row_overflow_grows_stride_test() {
        let atom = grid_atoms();
        let mut neighbor = Neighbor::new(11.0, 20, 4, 4, 4, false, false);
        neighbor.maxneighs = 4;
        neighbor.setup(&atom);
        neighbor.build(&atom);
        assert!(neighbor.maxneighs >= 26);
        assert_eq!(neighbor.numneigh[13], 26);
    }

    #[test]
    fn sort_preserves_set_test() {
        let mut atom = grid_atoms();
        let mut before: Vec<i64> = (0..atom.nlocal)
            .map(|i| (atom.x[i * PAD] * 1e6) as i64 + (atom.x[i * PAD + 2] * 1e3) as i64)
            .collect();
        let neighbor = {
            let mut n = Neighbor::new(3.6, 20, 6, 6, 6, false, false);
            n.setup(&atom);
            n
        };
        neighbor.sort(&mut atom);
        let mut after: Vec<i64> = (0..atom.nlocal)
            .map(|i| (atom.x[i * PAD] * 1e6) as i64 + (atom.x[i * PAD + 2] * 1e3) as i64)
            .collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }
}
