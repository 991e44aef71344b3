//! The moldyn application crate: input handling, run orchestration and the
//! YAML report around the engine crates.

pub mod input;
pub mod report;
pub mod run;

use thiserror::Error;

/// Anything that can abort a run before the dynamics start
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MoldynError {
    #[error(transparent)]
    Input(#[from] input::InputError),
    #[error(transparent)]
    Potential(#[from] moldyn_force::PotentialError),
    #[error(transparent)]
    DataFile(#[from] moldyn_system::DataFileError),
}
