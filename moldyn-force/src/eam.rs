use rayon::prelude::*;

use moldyn_comm::{Comm, CommPayload};
use moldyn_neighbor::Neighbor;
use moldyn_system::{Atom, PAD};

use crate::funcfl::Funcfl;
use crate::spline::SplineTable;

/// Converts the tabulated effective charges into the z2r pair term
const ZR_TO_Z2R: f64 = 27.2 * 0.529;

/// Embedded Atom Method potential for a single species.
///
/// Every compute is two passes over the neighbor list with one halo exchange
/// in between: pass one accumulates the local electron density and the
/// derivative of the embedding energy, `fp`; the exchange images `fp` onto
/// the ghosts; pass two evaluates the pair forces, which need `fp` of both
/// endpoints. All table lookups go through cubic spline rows resampled onto
/// a uniform grid.
pub struct ForceEam {
    pub cutforce: f64,
    cutforcesq: f64,
    pub mass: f64,
    nr: usize,
    rdr: f64,
    rdrho: f64,
    frho_spline: SplineTable,
    rhor_spline: SplineTable,
    z2r_spline: SplineTable,
    rho: Vec<f64>,
    fp: Vec<f64>,
    pub eng_vdwl: f64,
    pub virial: f64,
    pub evflag: bool,
}

/// One scalar per atom riding the recorded halo swaps; shifts do not apply
struct ScalarHalo<'a> {
    values: &'a mut Vec<f64>,
}

impl CommPayload for ScalarHalo<'_> {
    fn width(&self) -> usize {
        1
    }

    fn pack_forward(&self, list: &[usize], _shift: [f64; 3], buf: &mut Vec<f64>) {
        for &j in list {
            buf.push(self.values[j]);
        }
    }

    fn unpack_forward(&mut self, first: usize, n: usize, buf: &[f64]) {
        self.values[first..first + n].copy_from_slice(&buf[..n]);
    }

    fn pack_reverse(&self, first: usize, n: usize, buf: &mut Vec<f64>) {
        buf.extend_from_slice(&self.values[first..first + n]);
    }

    fn unpack_reverse(&mut self, list: &[usize], buf: &[f64]) {
        for (i, &j) in list.iter().enumerate() {
            self.values[j] += buf[i];
        }
    }
}

impl ForceEam {
    /// Builds the potential from a parsed `funcfl` file: the raw tables are
    /// resampled onto one uniform grid with quartic-weighted Lagrange
    /// interpolation and converted to spline rows.
    pub fn from_table(file: &Funcfl) -> ForceEam {
        let dr = file.dr;
        let drho = file.drho;
        let rmax = (file.nr - 1) as f64 * dr;
        let rhomax = (file.nrho - 1) as f64 * drho;
        // 0.5 absorbs round-off in the divide
        let nr = (rmax / dr + 0.5) as usize;
        let nrho = (rhomax / drho + 0.5) as usize;

        let mut frho = vec![0.0; nrho + 1];
        for m in 1..=nrho {
            let r = (m - 1) as f64 * drho;
            frho[m] = lagrange_resample(&file.frho, file.nrho, file.drho, r);
        }

        let mut rhor = vec![0.0; nr + 1];
        let mut z2r = vec![0.0; nr + 1];
        for m in 1..=nr {
            let r = (m - 1) as f64 * dr;
            rhor[m] = lagrange_resample(&file.rhor, file.nr, file.dr, r);
            let zri = lagrange_resample(&file.zr, file.nr, file.dr, r);
            z2r[m] = ZR_TO_Z2R * zri * zri;
        }

        ForceEam {
            cutforce: file.cut,
            cutforcesq: file.cut * file.cut,
            mass: file.mass,
            nr,
            rdr: 1.0 / dr,
            rdrho: 1.0 / drho,
            frho_spline: SplineTable::from_values(nrho, drho, &frho),
            rhor_spline: SplineTable::from_values(nr, dr, &rhor),
            z2r_spline: SplineTable::from_values(nr, dr, &z2r),
            rho: Vec::new(),
            fp: Vec::new(),
            eng_vdwl: 0.0,
            virial: 0.0,
            evflag: false,
        }
    }

    pub fn compute(&mut self, atom: &mut Atom, neighbor: &Neighbor, comm: &mut Comm) {
        self.eng_vdwl = 0.0;
        self.virial = 0.0;
        // per-atom work arrays track the store capacity and never shrink
        if self.fp.len() < atom.nmax {
            self.fp.resize(atom.nmax, 0.0);
            self.rho.resize(atom.nmax, 0.0);
        }
        if neighbor.halfneigh {
            self.compute_halfneigh(atom, neighbor, comm);
        } else {
            self.compute_fullneigh(atom, neighbor, comm);
        }
    }

    /// Half-list kernel. Density contributions are written to both endpoints
    /// of every stored pair; under ghost-Newton the ghost shares are first
    /// returned to their owners before the embedding derivative is taken.
    fn compute_halfneigh(&mut self, atom: &mut Atom, neighbor: &Neighbor, comm: &mut Comm) {
        let nlocal = atom.nlocal;
        let nall = atom.nall();
        let ghost_newton = neighbor.ghost_newton;
        let mut evdwl = 0.0;

        // ---------- pass 1: density at every owned atom
        self.rho[..nall].fill(0.0);
        for i in 0..nlocal {
            let xtmp = atom.x[i * PAD];
            let ytmp = atom.x[i * PAD + 1];
            let ztmp = atom.x[i * PAD + 2];
            let mut rhoi = 0.0;
            for &j in neighbor.row(i) {
                let delx = xtmp - atom.x[j * PAD];
                let dely = ytmp - atom.x[j * PAD + 1];
                let delz = ztmp - atom.x[j * PAD + 2];
                let rsq = delx * delx + dely * dely + delz * delz;
                if rsq < self.cutforcesq {
                    let (m, p) = self.rhor_spline.locate(rsq.sqrt() * self.rdr);
                    let contrib = self.rhor_spline.value(m, p);
                    rhoi += contrib;
                    if j < nlocal || ghost_newton {
                        self.rho[j] += contrib;
                    }
                }
            }
            self.rho[i] += rhoi;
        }
        if ghost_newton {
            comm.reverse(&mut ScalarHalo {
                values: &mut self.rho,
            });
        }

        // ---------- embedding derivative, and embedding energy when sampled
        for i in 0..nlocal {
            let (m, p) = self.frho_spline.locate(self.rho[i] * self.rdrho);
            self.fp[i] = self.frho_spline.derivative(m, p);
            if self.evflag {
                evdwl += self.frho_spline.value(m, p);
            }
        }

        // ---------- image fp onto the ghosts
        comm.forward(&mut ScalarHalo {
            values: &mut self.fp,
        });

        // ---------- pass 2: pair forces
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
                    let (fpair, phi) = self.pair_terms(rsq, self.fp[i], self.fp[j]);
                    fx += delx * fpair;
                    fy += dely * fpair;
                    fz += delz * fpair;
                    if j < nlocal || ghost_newton {
                        atom.f[j * PAD] -= delx * fpair;
                        atom.f[j * PAD + 1] -= dely * fpair;
                        atom.f[j * PAD + 2] -= delz * fpair;
                    }
                    if self.evflag {
                        let scale = if j < nlocal || ghost_newton { 1.0 } else { 0.5 };
                        self.virial += scale * rsq * fpair;
                        evdwl += scale * phi;
                    }
                }
            }
            atom.f[i * PAD] += fx;
            atom.f[i * PAD + 1] += fy;
            atom.f[i * PAD + 2] += fz;
        }

        self.eng_vdwl = evdwl;
    }

    /// Full-list kernel: both passes write only their own atom and are
    /// data-parallel over owned atoms. Accumulators are stored doubled, like
    /// every full-list kernel.
    fn compute_fullneigh(&mut self, atom: &mut Atom, neighbor: &Neighbor, comm: &mut Comm) {
        let nlocal = atom.nlocal;
        let evflag = self.evflag;

        // ---------- pass 1: density and embedding derivative per owned atom
        let mut fp = std::mem::take(&mut self.fp);
        let embedding_energy: f64 = {
            let x = &atom.x;
            fp[..nlocal]
                .par_iter_mut()
                .enumerate()
                .map(|(i, fpi)| {
                    let xtmp = x[i * PAD];
                    let ytmp = x[i * PAD + 1];
                    let ztmp = x[i * PAD + 2];
                    let mut rhoi = 0.0;
                    for &j in neighbor.row(i) {
                        let delx = xtmp - x[j * PAD];
                        let dely = ytmp - x[j * PAD + 1];
                        let delz = ztmp - x[j * PAD + 2];
                        let rsq = delx * delx + dely * dely + delz * delz;
                        if rsq < self.cutforcesq {
                            let (m, p) = self.rhor_spline.locate(rsq.sqrt() * self.rdr);
                            rhoi += self.rhor_spline.value(m, p);
                        }
                    }
                    let (m, p) = self.frho_spline.locate(rhoi * self.rdrho);
                    *fpi = self.frho_spline.derivative(m, p);
                    if evflag {
                        self.frho_spline.value(m, p)
                    } else {
                        0.0
                    }
                })
                .sum()
        };

        // ---------- image fp onto the ghosts
        comm.forward(&mut ScalarHalo { values: &mut fp });

        // ---------- pass 2: pair forces
        let (pair_energy, t_virial) = {
            let x = &atom.x;
            let fp = &fp;
            atom.f[..nlocal * PAD]
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
                        if rsq < self.cutforcesq {
                            let (fpair, phi) = self.pair_terms(rsq, fp[i], fp[j]);
                            fx += delx * fpair;
                            fy += dely * fpair;
                            fz += delz * fpair;
                            if evflag {
                                virial += 0.5 * rsq * fpair;
                                energy += 0.5 * phi;
                            }
                        }
                    }
                    fi[0] = fx;
                    fi[1] = fy;
                    fi[2] = fz;
                    (energy, virial)
                })
                .reduce(|| (0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1))
        };
        self.fp = fp;

        self.virial = t_virial;
        self.eng_vdwl = 2.0 * (embedding_energy + pair_energy);
    }

    /// Pair force factor and pair energy `phi` for one squared distance.
    ///
    /// `psip` needs the embedding derivatives of both endpoints, since the
    /// pair distance enters both embedding terms; with a single species the
    /// density derivative is the same seen from either side.
    #[inline(always)]
    fn pair_terms(&self, rsq: f64, fp_i: f64, fp_j: f64) -> (f64, f64) {
        let r = rsq.sqrt();
        let (m, p) = self.rhor_spline.locate(r * self.rdr);
        let rhoip = self.rhor_spline.derivative(m, p);
        let z2p = self.z2r_spline.derivative(m, p);
        let z2 = self.z2r_spline.value(m, p);

        let recip = 1.0 / r;
        let phi = z2 * recip;
        let phip = z2p * recip - phi * recip;
        let psip = fp_i * rhoip + fp_j * rhoip + phip;
        (-psip * recip, phi)
    }

    /// Number of knots of the unified radial grid
    pub fn nr(&self) -> usize {
        self.nr
    }
}

/// Quartic-weighted 4-point Lagrange interpolation of a 1-indexed table
fn lagrange_resample(src: &[f64], src_n: usize, src_delta: f64, r: f64) -> f64 {
    let sixth = 1.0 / 6.0;
    let mut p = r / src_delta + 1.0;
    let k = (p as usize).clamp(2, src_n - 2);
    p -= k as f64;
    p = p.min(2.0);
    let cof1 = -sixth * p * (p - 1.0) * (p - 2.0);
    let cof2 = 0.5 * (p * p - 1.0) * (p - 2.0);
    let cof3 = -0.5 * p * (p + 1.0) * (p - 2.0);
    let cof4 = sixth * p * (p * p - 1.0);
    cof1 * src[k - 1] + cof2 * src[k] + cof3 * src[k + 1] + cof4 * src[k + 2]
}
