use std::time::Instant;

use moldyn_comm::Comm;
use moldyn_force::Force;
use moldyn_neighbor::Neighbor;
use moldyn_system::{Atom, PAD};

use crate::thermo::Thermo;
use crate::timer::Timer;

/// Velocity-Verlet integrator.
///
/// Each step is a half velocity kick, a position drift, a refresh of the
/// decomposition (either a cheap forward update of the ghost positions or,
/// when a rebuild is due, full migration + borders + neighbor rebuild), the
/// force evaluation and the closing half kick. A rebuild becomes due on the
/// `every` cadence, or earlier when a global reduction notices that some
/// atom has travelled more than half the neighbor skin since the last build.
pub struct Integrate {
    pub ntimes: usize,
    pub dt: f64,
    /// half-step force prefactor; divided by `mvv2e` in metal units
    pub dtforce: f64,
    /// bin-sort cadence in steps; 0 disables sorting
    pub sort_every: usize,
    /// squared displacement that forces an early rebuild
    trigger_sq: f64,
    xhold: Vec<f64>,
}

impl Integrate {
    pub fn new(ntimes: usize, dt: f64, sort_every: usize) -> Integrate {
        Integrate {
            ntimes,
            dt,
            dtforce: 0.5 * dt,
            sort_every,
            trigger_sq: f64::INFINITY,
            xhold: Vec::new(),
        }
    }

    /// Arms the early-rebuild trigger for a given skin thickness
    pub fn set_skin(&mut self, skin: f64) {
        let half = skin / 2.0;
        self.trigger_sq = half * half;
    }

    fn hold_positions(&mut self, atom: &Atom) {
        self.xhold.clear();
        self.xhold
            .extend_from_slice(&atom.x[..atom.nlocal * PAD]);
    }

    /// Largest squared displacement of an owned atom since the last rebuild
    fn max_travel_sq(&self, atom: &Atom) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..atom.nlocal {
            let mut d2 = 0.0;
            for d in 0..3 {
                let del = atom.x[i * PAD + d] - self.xhold[i * PAD + d];
                d2 += del * del;
            }
            worst = worst.max(d2);
        }
        worst
    }

    /// Runs `ntimes` steps of dynamics
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        &mut self,
        atom: &mut Atom,
        force: &mut Force,
        neighbor: &mut Neighbor,
        comm: &mut Comm,
        thermo: &mut Thermo,
        timer: &mut Timer,
    ) {
        let dtf = self.dtforce / atom.mass;
        self.hold_positions(atom);
        let run_start = Instant::now();

        for n in 0..self.ntimes {
            let step = n + 1;

            // ---------- half kick plus drift
            for i in 0..atom.nlocal {
                for d in 0..3 {
                    atom.v[i * PAD + d] += dtf * atom.f[i * PAD + d];
                    atom.x[i * PAD + d] += self.dt * atom.v[i * PAD + d];
                }
            }

            // ---------- refresh the decomposition when due
            let cadence_due = step % neighbor.every == 0;
            let rebuild = cadence_due
                || comm.any(self.max_travel_sq(atom) > self.trigger_sq);
            if rebuild {
                Timer::stamp(&mut timer.comm, || comm.exchange(atom));
                if self.sort_every > 0 && step % self.sort_every == 0 {
                    Timer::stamp(&mut timer.neigh, || neighbor.sort(atom));
                }
                Timer::stamp(&mut timer.comm, || comm.borders(atom));
                Timer::stamp(&mut timer.neigh, || neighbor.build(atom));
                self.hold_positions(atom);
            } else {
                Timer::stamp(&mut timer.comm, || comm.forward(atom));
            }

            // ---------- forces
            let nall = atom.nall();
            atom.f[..nall * PAD].fill(0.0);
            force.set_evflag(thermo.nstat > 0 && step % thermo.nstat == 0);
            Timer::stamp(&mut timer.force, || force.compute(atom, neighbor, comm));
            if neighbor.halfneigh && neighbor.ghost_newton {
                Timer::stamp(&mut timer.comm, || comm.reverse(atom));
            }

            // ---------- closing half kick
            for i in 0..atom.nlocal {
                for d in 0..3 {
                    atom.v[i * PAD + d] += dtf * atom.f[i * PAD + d];
                }
            }

            timer.total = run_start.elapsed().as_secs_f64();
            if thermo.nstat > 0 {
                thermo.compute(step as i64, atom, neighbor, force, comm, timer);
            }
        }
    }
}
