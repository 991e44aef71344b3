use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use moldyn_comm::Comm;
use moldyn_force::Force;
use moldyn_neighbor::Neighbor;
use moldyn_system::{Atom, PAD};

use crate::integrate::Integrate;
use crate::timer::Timer;

/// Unit system of a run, after the LAMMPS conventions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Units {
    Lj,
    Metal,
}

/// Thermodynamic reductions and the sample history of a run.
///
/// Temperature, potential energy and pressure are global sums over ranks.
/// Kernel accumulators arrive in two conventions: full-list kernels store
/// energy doubled (every pair is visited twice) and half-list kernels store
/// it plain, so the reduction doubles half-list values first and halves
/// everything at the end through `e_scale`. The virial is stored once per
/// pair by all kernels and needs no such folding.
pub struct Thermo {
    /// sampling cadence in steps; 0 samples only the run ends
    pub nstat: usize,
    ntimes: usize,
    rho: f64,
    mvv2e: f64,
    dof_boltz: f64,
    t_scale: f64,
    p_scale: f64,
    e_scale: f64,
    pub steps: Vec<usize>,
    pub temperatures: Vec<f64>,
    pub energies: Vec<f64>,
    pub pressures: Vec<f64>,
    /// suppress the per-sample print of rank 0
    pub quiet: bool,
}

impl Thermo {
    pub fn new(nstat: usize, ntimes: usize) -> Thermo {
        Thermo {
            nstat,
            ntimes,
            rho: 0.0,
            mvv2e: 1.0,
            dof_boltz: 1.0,
            t_scale: 1.0,
            p_scale: 1.0,
            e_scale: 0.5,
            steps: Vec::new(),
            temperatures: Vec::new(),
            energies: Vec::new(),
            pressures: Vec::new(),
            quiet: false,
        }
    }

    /// Fixes the unit conversion factors once the global atom count and box
    /// are known. In metal units the force-update prefactor of the
    /// integrator absorbs the mass-velocity-to-energy conversion.
    pub fn setup(&mut self, rho: f64, integrate: &mut Integrate, atom: &Atom, units: Units) {
        self.rho = rho;
        let volume = atom.simbox.volume();
        let natoms = atom.natoms as f64;
        match units {
            Units::Lj => {
                self.mvv2e = 1.0;
                self.dof_boltz = natoms * 3.0 - 3.0;
                self.t_scale = self.mvv2e / self.dof_boltz;
                self.p_scale = 1.0 / 3.0 / volume;
                self.e_scale = 0.5;
            }
            Units::Metal => {
                self.mvv2e = 1.036427e-04;
                self.dof_boltz = (natoms * 3.0 - 3.0) * 8.617343e-05;
                self.t_scale = self.mvv2e / self.dof_boltz;
                self.p_scale = 1.602176e+06 / 3.0 / volume;
                self.e_scale = 524287.985533;
                integrate.dtforce /= self.mvv2e;
            }
        }
    }

    /// Number density the run was set up with; for data-file runs this is
    /// the count over the box volume rather than an input-file request
    pub fn density(&self) -> f64 {
        self.rho
    }

    /// Reduced temperature of the whole system
    pub fn temperature(&self, atom: &Atom, comm: &mut Comm) -> f64 {
        let mut t_act = 0.0;
        for i in 0..atom.nlocal {
            let vx = atom.v[i * PAD];
            let vy = atom.v[i * PAD + 1];
            let vz = atom.v[i * PAD + 2];
            t_act += (vx * vx + vy * vy + vz * vz) * atom.mass;
        }
        comm.sum(t_act) * self.t_scale
    }

    /// Potential energy per atom, reduced over ranks
    pub fn energy(&self, atom: &Atom, neighbor: &Neighbor, force: &Force, comm: &mut Comm) -> f64 {
        let mut e_act = force.eng_vdwl();
        if neighbor.halfneigh {
            e_act *= 2.0;
        }
        e_act *= self.e_scale;
        comm.sum(e_act) / atom.natoms as f64
    }

    /// Reduced pressure from the kinetic term plus the pair virial
    pub fn pressure(&self, t: f64, force: &Force, comm: &mut Comm) -> f64 {
        let virial = comm.sum(force.virial());
        (t * self.dof_boltz + virial) * self.p_scale
    }

    /// Takes one thermo sample when the step asks for one.
    ///
    /// `iflag` is the current step, `0` for the pre-run sample or `-1` for
    /// the final one; the final sample is skipped when the cadence already
    /// sampled the last step. Rank 0 prints the `step T U P elapsed` line.
    pub fn compute(
        &mut self,
        iflag: i64,
        atom: &Atom,
        neighbor: &Neighbor,
        force: &Force,
        comm: &mut Comm,
        timer: &Timer,
    ) {
        if iflag > 0 && self.nstat > 0 && iflag % self.nstat as i64 != 0 {
            return;
        }
        if iflag > 0 && self.nstat == 0 {
            return;
        }
        if iflag == -1 && self.nstat > 0 && self.ntimes % self.nstat == 0 {
            return;
        }
        let istep = if iflag == -1 {
            self.ntimes
        } else {
            iflag as usize
        };

        let t = self.temperature(atom, comm);
        let eng = self.energy(atom, neighbor, force, comm);
        let p = self.pressure(t, force, comm);

        self.steps.push(istep);
        self.temperatures.push(t);
        self.energies.push(eng);
        self.pressures.push(p);

        if comm.me() == 0 && !self.quiet {
            println!("{} {:.6e} {:.6e} {:.6e} {:6.3}", istep, t, eng, p, timer.total);
        }
    }

    /// Replaces the builder velocities with a Maxwell-Boltzmann set at the
    /// requested temperature: the center-of-mass drift is removed and the
    /// remainder rescaled. A deterministic fallback draw covers stores whose
    /// builder left the velocities at zero (data files without a
    /// `Velocities` section).
    pub fn create_velocity(
        &self,
        t_request: f64,
        atom: &mut Atom,
        comm: &mut Comm,
    ) {
        let mut all_zero = true;
        for i in 0..atom.nlocal * PAD {
            if atom.v[i] != 0.0 {
                all_zero = false;
                break;
            }
        }
        if !comm.any(!all_zero) {
            let mut rng = SmallRng::seed_from_u64(comm.me() as u64 + 1);
            for i in 0..atom.nlocal * PAD {
                atom.v[i] = rng.gen::<f64>() - 0.5;
            }
        }

        // ---------- remove the center-of-mass motion
        let mut sums = vec![0.0; 3];
        for i in 0..atom.nlocal {
            for d in 0..3 {
                sums[d] += atom.v[i * PAD + d];
            }
        }
        let totals = comm.sum_vec(sums);
        let natoms = atom.natoms as f64;
        for i in 0..atom.nlocal {
            for d in 0..3 {
                atom.v[i * PAD + d] -= totals[d] / natoms;
            }
        }

        // ---------- rescale to the requested temperature
        let t = self.temperature(atom, comm);
        let factor = (t_request / t).sqrt();
        for i in 0..atom.nlocal * PAD {
            atom.v[i] *= factor;
        }
    }
}
