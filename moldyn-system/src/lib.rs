//! Simulation box and atom storage for the moldyn package.
//!
//! The crate provides the two data structures every other moldyn crate builds
//! upon: [`SimBox`], the periodic global box together with the sub-box owned by
//! one rank, and [`Atom`], a structure-of-arrays store for positions,
//! velocities and forces of owned and ghost atoms. One-off system builders
//! (FCC lattice fill, per-site seeded velocities, LAMMPS data files) complete
//! the crate.

mod atom;
mod data_file;
mod lattice;
mod simbox;

pub use atom::{Atom, BORDER_WIDTH, EXCHANGE_WIDTH, PAD};
pub use data_file::{read_lammps_data, DataFile, DataFileError};
pub use lattice::{create_atoms, create_box, fcc_lattice_constant};
pub use simbox::SimBox;

/// Equality test for floating point values within a given tolerance
#[macro_export]
macro_rules! assert_close {
    ($lhs:expr, $rhs:expr, $tolerance:expr) => {
        assert!(
            ($lhs - $rhs).abs() < $tolerance,
            "Floating point comparison between {} and {} failed for tolerance {}",
            $lhs,
            $rhs,
            $tolerance
        );
    };
}
