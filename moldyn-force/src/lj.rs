use rayon::prelude::*;

use moldyn_neighbor::Neighbor;
use moldyn_system::{Atom, PAD};

/// Pair force factor and `sigma^6 / r^6` for one squared distance
macro_rules! lj_pair {
    ($rsq:expr, $sigma6:expr, $epsilon:expr) => {{
        let sr2 = 1.0 / $rsq;
        let sr6 = sr2 * sr2 * sr2 * $sigma6;
        (48.0 * sr6 * (sr6 - 0.5) * sr2 * $epsilon, sr6)
    }};
}

/// Lennard-Jones 12-6 pair potential.
///
/// Three kernel forms cover the neighbor-list styles: the full-list form
/// writes only `f[i]` and is data-parallel without hazards; the half-list
/// form applies Newton's third law inside the loop and runs serially; the
/// threaded half-list form gives every worker a shadow force array reduced
/// at the end of the kernel, since distinct workers may share a `j` atom.
pub struct ForceLj {
    pub cutforce: f64,
    cutforcesq: f64,
    pub epsilon: f64,
    pub sigma: f64,
    sigma6: f64,
    pub eng_vdwl: f64,
    pub virial: f64,
    pub evflag: bool,
}

impl ForceLj {
    pub fn new(cutforce: f64, epsilon: f64, sigma: f64) -> ForceLj {
        ForceLj {
            cutforce,
            cutforcesq: cutforce * cutforce,
            epsilon,
            sigma,
            sigma6: sigma.powi(6),
            eng_vdwl: 0.0,
            virial: 0.0,
            evflag: false,
        }
    }

    pub fn compute(&mut self, atom: &mut Atom, neighbor: &Neighbor) {
        self.eng_vdwl = 0.0;
        self.virial = 0.0;
        if !neighbor.halfneigh {
            self.compute_fullneigh(atom, neighbor);
        } else if rayon::current_num_threads() > 1 {
            self.compute_halfneigh_threaded(atom, neighbor);
        } else {
            self.compute_halfneigh(atom, neighbor);
        }
    }

    /// Full-list kernel: each pair is visited from both sides, each visit
    /// writes only its own atom. Energy and virial are therefore accumulated
    /// doubled; the thermo normalization folds the factor back out.
    fn compute_fullneigh(&mut self, atom: &mut Atom, neighbor: &Neighbor) {
        let nlocal = atom.nlocal;
        let x = &atom.x;
        let cutforcesq = self.cutforcesq;
        let sigma6 = self.sigma6;
        let epsilon = self.epsilon;
        let evflag = self.evflag;

        let (t_energy, t_virial) = atom.f[..nlocal * PAD]
            .par_chunks_mut(PAD)
            .enumerate()
            .map(|(i, fi)| {
                let xtmp = x[i * PAD];
                let ytmp = x[i * PAD + 1];
                let ztmp = x[i * PAD + 2];
                let mut fx = 0.0;
                let mut fy = 0.0;
                let mut fz = 0.0;
                let mut energy = 0.0;
                let mut virial = 0.0;
                for &j in neighbor.row(i) {
                    let delx = xtmp - x[j * PAD];
                    let dely = ytmp - x[j * PAD + 1];
                    let delz = ztmp - x[j * PAD + 2];
                    let rsq = delx * delx + dely * dely + delz * delz;
                    if rsq < cutforcesq {
                        let (force, sr6) = lj_pair!(rsq, sigma6, epsilon);
                        fx += delx * force;
                        fy += dely * force;
                        fz += delz * force;
                        if evflag {
                            energy += sr6 * (sr6 - 1.0);
                            virial += rsq * force;
                        }
                    }
                }
                fi[0] = fx;
                fi[1] = fy;
                fi[2] = fz;
                (energy, virial)
            })
            .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1));

        self.eng_vdwl = 4.0 * self.epsilon * t_energy;
        self.virial = 0.5 * t_virial;
    }

    /// Half-list kernel: every stored pair updates both endpoints, except
    /// that ghost partners are written only under ghost-Newton. Without
    /// ghost-Newton a local-ghost pair is stored on both ranks, so its energy
    /// and virial count half on each.
    fn compute_halfneigh(&mut self, atom: &mut Atom, neighbor: &Neighbor) {
        let nlocal = atom.nlocal;
        let ghost_newton = neighbor.ghost_newton;
        let mut t_energy = 0.0;
        let mut t_virial = 0.0;

        for i in 0..nlocal {
            let xtmp = atom.x[i * PAD];
            let ytmp = atom.x[i * PAD + 1];
            let ztmp = atom.x[i * PAD + 2];
            let mut fx = 0.0;
            let mut fy = 0.0;
            let mut fz = 0.0;
            for &j in neighbor.row(i) {
                let delx = xtmp - atom.x[j * PAD];
                let dely = ytmp - atom.x[j * PAD + 1];
                let delz = ztmp - atom.x[j * PAD + 2];
                let rsq = delx * delx + dely * dely + delz * delz;
                if rsq < self.cutforcesq {
                    let (force, sr6) = lj_pair!(rsq, self.sigma6, self.epsilon);
                    fx += delx * force;
                    fy += dely * force;
                    fz += delz * force;
                    if ghost_newton || j < nlocal {
                        atom.f[j * PAD] -= delx * force;
                        atom.f[j * PAD + 1] -= dely * force;
                        atom.f[j * PAD + 2] -= delz * force;
                    }
                    if self.evflag {
                        let scale = if ghost_newton || j < nlocal { 1.0 } else { 0.5 };
                        t_energy += scale * 4.0 * self.epsilon * sr6 * (sr6 - 1.0);
                        t_virial += scale * rsq * force;
                    }
                }
            }
            atom.f[i * PAD] += fx;
            atom.f[i * PAD + 1] += fy;
            atom.f[i * PAD + 2] += fz;
        }

        self.eng_vdwl = t_energy;
        self.virial = t_virial;
    }

    /// Threaded half-list kernel: workers accumulate into private shadow
    /// force arrays which are summed once all pairs are done
    fn compute_halfneigh_threaded(&mut self, atom: &mut Atom, neighbor: &Neighbor) {
        let nlocal = atom.nlocal;
        let nall = atom.nall();
        let ghost_newton = neighbor.ghost_newton;
        let x = &atom.x;
        let cutforcesq = self.cutforcesq;
        let sigma6 = self.sigma6;
        let epsilon = self.epsilon;
        let evflag = self.evflag;

        let workers = rayon::current_num_threads();
        let chunk = (nlocal + workers - 1) / workers;
        let shadows: Vec<(Vec<f64>, f64, f64)> = (0..workers)
            .into_par_iter()
            .map(|w| {
                let mut fl = vec![0.0; nall * PAD];
                let mut t_energy = 0.0;
                let mut t_virial = 0.0;
                for i in w * chunk..((w + 1) * chunk).min(nlocal) {
                    let xtmp = x[i * PAD];
                    let ytmp = x[i * PAD + 1];
                    let ztmp = x[i * PAD + 2];
                    let mut fx = 0.0;
                    let mut fy = 0.0;
                    let mut fz = 0.0;
                    for &j in neighbor.row(i) {
                        let delx = xtmp - x[j * PAD];
                        let dely = ytmp - x[j * PAD + 1];
                        let delz = ztmp - x[j * PAD + 2];
                        let rsq = delx * delx + dely * dely + delz * delz;
                        if rsq < cutforcesq {
                            let (force, sr6) = lj_pair!(rsq, sigma6, epsilon);
                            fx += delx * force;
                            fy += dely * force;
                            fz += delz * force;
                            if ghost_newton || j < nlocal {
                                fl[j * PAD] -= delx * force;
                                fl[j * PAD + 1] -= dely * force;
                                fl[j * PAD + 2] -= delz * force;
                            }
                            if evflag {
                                let scale = if ghost_newton || j < nlocal { 1.0 } else { 0.5 };
                                t_energy += scale * 4.0 * epsilon * sr6 * (sr6 - 1.0);
                                t_virial += scale * rsq * force;
                            }
                        }
                    }
                    fl[i * PAD] += fx;
                    fl[i * PAD + 1] += fy;
                    fl[i * PAD + 2] += fz;
                }
                (fl, t_energy, t_virial)
            })
            .collect();

        for (fl, t_energy, t_virial) in shadows {
            for (dst, src) in atom.f[..nall * PAD].iter_mut().zip(fl.iter()) {
                *dst += src;
            }
            self.eng_vdwl += t_energy;
            self.virial += t_virial;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moldyn_system::{assert_close, SimBox};

    /// A loose cluster far away from every box face, so no ghosts exist
    fn cluster() -> Atom {
        let mut atom = Atom::new(SimBox::new(40.0, 40.0, 40.0));
        let sites = [
            [20.0, 20.0, 20.0],
            [21.1, 20.3, 19.8],
            [19.4, 21.0, 20.6],
            [20.7, 19.2, 21.2],
            [18.9, 19.5, 19.3],
            [21.8, 21.4, 20.9],
        ];
        for s in sites {
            atom.add_atom(s[0], s[1], s[2], 0.0, 0.0, 0.0, 0);
        }
        atom
    }

    fn build_list(atom: &Atom, halfneigh: bool, ghost_newton: bool) -> Neighbor {
        let mut neighbor = Neighbor::new(2.8, 20, 16, 16, 16, halfneigh, ghost_newton);
        neighbor.setup(atom);
        neighbor.build(atom);
        neighbor
    }

    #[test]
    fn force_vanishes_at_minimum_test() {
        let r0 = 2.0_f64.powf(1.0 / 6.0);
        let mut atom = Atom::new(SimBox::new(40.0, 40.0, 40.0));
        atom.add_atom(20.0, 20.0, 20.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(20.0 + r0, 20.0, 20.0, 0.0, 0.0, 0.0, 0);
        let neighbor = build_list(&atom, false, false);

        let mut lj = ForceLj::new(2.5, 1.0, 1.0);
        lj.evflag = true;
        lj.compute(&mut atom, &neighbor);
        assert_close!(atom.f[0], 0.0, 1e-10);
        // the pair sits at the bottom of the well: u = -epsilon, stored doubled
        assert_close!(0.5 * lj.eng_vdwl, -1.0, 1e-10);
    }

    #[test]
    fn newton_third_law_test() {
        let mut atom = cluster();
        let neighbor = build_list(&atom, false, false);
        let mut lj = ForceLj::new(2.5, 1.0, 1.0);
        lj.compute(&mut atom, &neighbor);
        for d in 0..3 {
            let total: f64 = (0..atom.nlocal).map(|i| atom.f[i * PAD + d]).sum();
            assert_close!(total, 0.0, 1e-10);
        }
    }

    #[test]
    fn half_matches_full_test() {
        let mut full_atom = cluster();
        let full_list = build_list(&full_atom, false, false);
        let mut lj_full = ForceLj::new(2.5, 1.0, 1.0);
        lj_full.evflag = true;
        lj_full.compute(&mut full_atom, &full_list);

        let mut half_atom = cluster();
        let half_list = build_list(&half_atom, true, false);
        let mut lj_half = ForceLj::new(2.5, 1.0, 1.0);
        lj_half.evflag = true;
        lj_half.compute(&mut half_atom, &half_list);

        for i in 0..full_atom.nlocal * PAD {
            assert_close!(full_atom.f[i], half_atom.f[i], 1e-12);
        }
        // full-list accumulators are stored doubled
        assert_close!(0.5 * lj_full.eng_vdwl, lj_half.eng_vdwl, 1e-10);
        assert_close!(lj_full.virial, lj_half.virial, 1e-10);
    }

    #[test]
    fn threaded_shadow_matches_serial_test() {
        let mut serial_atom = cluster();
        let list = build_list(&serial_atom, true, false);
        let mut lj = ForceLj::new(2.5, 1.0, 1.0);
        lj.evflag = true;
        lj.compute_halfneigh(&mut serial_atom, &list);
        let serial_energy = lj.eng_vdwl;

        let mut shadow_atom = cluster();
        let mut lj2 = ForceLj::new(2.5, 1.0, 1.0);
        lj2.evflag = true;
        lj2.compute_halfneigh_threaded(&mut shadow_atom, &list);

        for i in 0..serial_atom.nlocal * PAD {
            assert_close!(serial_atom.f[i], shadow_atom.f[i], 1e-12);
        }
        assert_close!(serial_energy, lj2.eng_vdwl, 1e-12);
    }
}
