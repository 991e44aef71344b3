//! Time integration and thermodynamic output.
//!
//! [`Integrate`] drives the velocity-Verlet loop and decides, step by step,
//! whether the decomposition must be refreshed (migration, borders, neighbor
//! rebuild) or a cheap ghost-position update suffices. [`Thermo`] owns the
//! unit system and reduces kinetic energy, potential energy and virial into
//! the temperature, energy and pressure samples of a run. [`Timer`] splits
//! the wall clock over the major phases.

mod integrate;
mod thermo;
mod timer;

pub use integrate::Integrate;
pub use thermo::{Thermo, Units};
pub use timer::Timer;
