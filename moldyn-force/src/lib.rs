//! Force kernels of the moldyn package.
//!
//! Two interaction models are provided: the Lennard-Jones 12-6 pair
//! potential ([`ForceLj`]) and the Embedded Atom Method ([`ForceEam`]) with
//! its DYNAMO `funcfl` table loader. Both consume the neighbor list and
//! produce per-atom forces plus the potential energy and pressure virial
//! accumulators the thermo reductions read.

mod eam;
mod funcfl;
mod lj;
mod spline;

pub use eam::ForceEam;
pub use funcfl::{parse_funcfl, read_funcfl, Funcfl, PotentialError};
pub use lj::ForceLj;
pub use spline::SplineTable;

use moldyn_comm::Comm;
use moldyn_neighbor::Neighbor;
use moldyn_system::Atom;

/// The interaction model of a run.
///
/// The integrator sees one uniform compute contract; the variant decides the
/// kernel. Energy and virial accumulators follow one convention: full-list
/// kernels store doubled totals (every pair is visited from both sides) and
/// half-list kernels store plain totals, which the thermo normalization
/// folds back together.
pub enum Force {
    Lj(ForceLj),
    Eam(ForceEam),
}

impl Force {
    pub fn compute(&mut self, atom: &mut Atom, neighbor: &Neighbor, comm: &mut Comm) {
        match self {
            Force::Lj(lj) => lj.compute(atom, neighbor),
            Force::Eam(eam) => eam.compute(atom, neighbor, comm),
        }
    }

    pub fn cutforce(&self) -> f64 {
        match self {
            Force::Lj(lj) => lj.cutforce,
            Force::Eam(eam) => eam.cutforce,
        }
    }

    pub fn eng_vdwl(&self) -> f64 {
        match self {
            Force::Lj(lj) => lj.eng_vdwl,
            Force::Eam(eam) => eam.eng_vdwl,
        }
    }

    pub fn virial(&self) -> f64 {
        match self {
            Force::Lj(lj) => lj.virial,
            Force::Eam(eam) => eam.virial,
        }
    }

    pub fn set_evflag(&mut self, evflag: bool) {
        match self {
            Force::Lj(lj) => lj.evflag = evflag,
            Force::Eam(eam) => eam.evflag = evflag,
        }
    }

    /// Mass the potential prescribes for the atoms, if it does
    pub fn mass(&self) -> Option<f64> {
        match self {
            Force::Lj(_) => None,
            Force::Eam(eam) => Some(eam.mass),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Force::Lj(_) => "LJ",
            Force::Eam(_) => "EAM",
        }
    }
}
