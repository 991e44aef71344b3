//! Spatial decomposition and ghost-atom communication.
//!
//! A simulation runs on a fixed set of ranks, each owning one sub-box of the
//! periodic global box. This crate provides the three layers that keep the
//! decomposition coherent:
//!
//! * [`Mesh`] / [`Rank`] - the process model: ranks as threads joined by a
//!   channel mesh with point-to-point `send`/`recv` and the handful of
//!   collectives the engine needs (sum, max, any, broadcast, barrier);
//! * [`Comm`] - the swap plan built from the process grid, atom migration
//!   (`exchange`), ghost region construction (`borders`) and the per-step
//!   forward/reverse halo updates;
//! * [`CommPayload`] - the capability a data owner implements so that `Comm`
//!   can replay its recorded send lists against any per-atom quantity
//!   (positions and forces for the atom store, embedding derivatives for the
//!   EAM potential).

mod comm;
mod mesh;
mod payload;

pub use comm::Comm;
pub use mesh::{Mesh, Rank};
pub use payload::CommPayload;
