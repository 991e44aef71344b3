use log::warn;

use moldyn_system::{Atom, BORDER_WIDTH, EXCHANGE_WIDTH, PAD};

use crate::mesh::Rank;
use crate::payload::CommPayload;

const TAG_EXCHANGE: u16 = 1;
const TAG_BORDER: u16 = 2;
const TAG_FORWARD: u16 = 3;
const TAG_REVERSE: u16 = 4;

/// Halo communication of one rank.
///
/// `setup()` factors the rank count into a 3-d process grid, assigns this
/// rank its sub-box and derives the ordered swap plan: for every dimension
/// (x, then y, then z) and every slab depth, one swap towards the low face
/// and one towards the high face. Swaps whose partner is this rank itself
/// (a dimension owned entirely by one rank) short-circuit by reusing the
/// send buffer as the receive buffer.
///
/// `exchange()` migrates atoms that left the sub-box, `borders()` rebuilds
/// the ghost region and records per-swap send lists, and `forward()` /
/// `reverse()` replay those lists for any [`CommPayload`].
pub struct Comm {
    rank: Rank,
    pub procgrid: [usize; 3],
    pub myloc: [usize; 3],
    procneigh: [[usize; 2]; 3],
    need: [usize; 3],
    prd: [f64; 3],
    pub nswap: usize,
    swap_dim: Vec<usize>,
    sendproc: Vec<usize>,
    recvproc: Vec<usize>,
    slablo: Vec<f64>,
    slabhi: Vec<f64>,
    pbc_any: Vec<bool>,
    pbc_flags: Vec<[i32; 3]>,
    sendlist: Vec<Vec<usize>>,
    sendnum: Vec<usize>,
    recvnum: Vec<usize>,
    firstrecv: Vec<usize>,
    /// warn when an atom appears to have moved further than one sub-box
    pub check_exchange: bool,
    /// repeat migration passes until every atom reached its owner
    pub do_safe_exchange: bool,
}

impl Comm {
    pub fn new(rank: Rank) -> Comm {
        Comm {
            rank,
            procgrid: [1; 3],
            myloc: [0; 3],
            procneigh: [[0; 2]; 3],
            need: [1; 3],
            prd: [0.0; 3],
            nswap: 0,
            swap_dim: Vec::new(),
            sendproc: Vec::new(),
            recvproc: Vec::new(),
            slablo: Vec::new(),
            slabhi: Vec::new(),
            pbc_any: Vec::new(),
            pbc_flags: Vec::new(),
            sendlist: Vec::new(),
            sendnum: Vec::new(),
            recvnum: Vec::new(),
            firstrecv: Vec::new(),
            check_exchange: false,
            do_safe_exchange: false,
        }
    }

    #[inline(always)]
    pub fn me(&self) -> usize {
        self.rank.me()
    }

    #[inline(always)]
    pub fn nprocs(&self) -> usize {
        self.rank.nprocs()
    }

    // ---------- collectives, delegated to the rank mesh
    pub fn sum(&mut self, x: f64) -> f64 {
        self.rank.sum(x)
    }
    pub fn sum_vec(&mut self, xs: Vec<f64>) -> Vec<f64> {
        self.rank.sum_vec(xs)
    }
    pub fn sum_usize(&mut self, n: usize) -> usize {
        self.rank.sum_usize(n)
    }
    pub fn max(&mut self, x: f64) -> f64 {
        self.rank.max(x)
    }
    pub fn any(&mut self, flag: bool) -> bool {
        self.rank.any(flag)
    }
    pub fn barrier(&mut self) {
        self.rank.barrier()
    }

    /// Computes the process grid and the swap plan for a given neighbor cutoff.
    ///
    /// The rank count is factored into a grid minimizing the summed sub-box
    /// surface; this rank's sub-box bounds are written into `atom.simbox`.
    /// Each dimension contributes `2 * need` swaps where `need` counts how
    /// many neighboring sub-boxes the cutoff reaches into.
    pub fn setup(&mut self, cutneigh: f64, atom: &mut Atom) {
        let nprocs = self.rank.nprocs();
        let me = self.rank.me();
        self.prd = [atom.simbox.xprd, atom.simbox.yprd, atom.simbox.zprd];

        // ---------- factor nprocs into a 3-d grid of minimal surface
        let area = [
            self.prd[0] * self.prd[1],
            self.prd[0] * self.prd[2],
            self.prd[1] * self.prd[2],
        ];
        let mut bestsurf = f64::INFINITY;
        for ipx in 1..=nprocs {
            if nprocs % ipx != 0 {
                continue;
            }
            let nremain = nprocs / ipx;
            for ipy in 1..=nremain {
                if nremain % ipy != 0 {
                    continue;
                }
                let ipz = nremain / ipy;
                let surf = area[0] / (ipx * ipy) as f64
                    + area[1] / (ipx * ipz) as f64
                    + area[2] / (ipy * ipz) as f64;
                if surf < bestsurf {
                    bestsurf = surf;
                    self.procgrid = [ipx, ipy, ipz];
                }
            }
        }

        // ---------- locate this rank and its six face neighbors
        let pg = self.procgrid;
        self.myloc = [me % pg[0], (me / pg[0]) % pg[1], me / (pg[0] * pg[1])];
        let rank_of = |c: [usize; 3]| c[0] + c[1] * pg[0] + c[2] * pg[0] * pg[1];
        for dim in 0..3 {
            let mut lo = self.myloc;
            lo[dim] = (self.myloc[dim] + pg[dim] - 1) % pg[dim];
            let mut hi = self.myloc;
            hi[dim] = (self.myloc[dim] + 1) % pg[dim];
            self.procneigh[dim] = [rank_of(lo), rank_of(hi)];
        }

        // ---------- sub-box of this rank
        for dim in 0..3 {
            let lo = self.myloc[dim] as f64 * self.prd[dim] / pg[dim] as f64;
            let hi = (self.myloc[dim] + 1) as f64 * self.prd[dim] / pg[dim] as f64;
            atom.simbox.set_bounds(dim, lo, hi);
        }

        for dim in 0..3 {
            self.need[dim] = (cutneigh * pg[dim] as f64 / self.prd[dim] + 1.0) as usize;
        }

        // ---------- swap plan: x-low, x-high, y-low, y-high, z-low, z-high,
        // repeated per slab depth when the cutoff spans several sub-boxes
        self.nswap = 0;
        self.swap_dim.clear();
        self.sendproc.clear();
        self.recvproc.clear();
        self.slablo.clear();
        self.slabhi.clear();
        self.pbc_any.clear();
        self.pbc_flags.clear();
        for dim in 0..3 {
            let subwidth = self.prd[dim] / pg[dim] as f64;
            for ineed in 0..2 * self.need[dim] {
                let mut flags = [0i32; 3];
                let mut any = false;
                let lo;
                let hi;
                let sendproc;
                let recvproc;
                if ineed % 2 == 0 {
                    // --- send towards the low face, receive from the high one
                    sendproc = self.procneigh[dim][0];
                    recvproc = self.procneigh[dim][1];
                    let nbox = self.myloc[dim] + ineed / 2;
                    lo = nbox as f64 * subwidth;
                    hi = (atom.simbox.lo(dim) + cutneigh).min((nbox + 1) as f64 * subwidth);
                    if self.myloc[dim] == 0 {
                        any = true;
                        flags[dim] = 1;
                    }
                } else {
                    // --- send towards the high face, receive from the low one
                    sendproc = self.procneigh[dim][1];
                    recvproc = self.procneigh[dim][0];
                    let nbox = self.myloc[dim] as i64 - (ineed / 2) as i64;
                    hi = (nbox + 1) as f64 * subwidth;
                    lo = (atom.simbox.hi(dim) - cutneigh).max(nbox as f64 * subwidth);
                    if self.myloc[dim] == pg[dim] - 1 {
                        any = true;
                        flags[dim] = -1;
                    }
                }
                self.swap_dim.push(dim);
                self.sendproc.push(sendproc);
                self.recvproc.push(recvproc);
                self.slablo.push(lo);
                self.slabhi.push(hi);
                self.pbc_any.push(any);
                self.pbc_flags.push(flags);
                self.nswap += 1;
            }
        }
        self.sendlist = vec![Vec::new(); self.nswap];
        self.sendnum = vec![0; self.nswap];
        self.recvnum = vec![0; self.nswap];
        self.firstrecv = vec![0; self.nswap];
    }

    /// Moves atoms that left the sub-box to their new owner.
    ///
    /// One pass hands each leaver to the face neighbor of the dimension it
    /// crossed, dimension by dimension, so a diagonal move reaches its owner
    /// through intermediate ranks. In safe mode the pass repeats until a
    /// global reduction reports every atom inside its owner's sub-box, which
    /// also covers atoms travelling several sub-boxes per step.
    pub fn exchange(&mut self, atom: &mut Atom) {
        atom.pbc();
        atom.nghost = 0;
        if !self.do_safe_exchange {
            self.exchange_pass(atom);
            return;
        }
        loop {
            self.exchange_pass(atom);
            let mut settled = true;
            for i in 0..atom.nlocal {
                for dim in 0..3 {
                    if self.procgrid[dim] == 1 {
                        continue;
                    }
                    let c = atom.x[i * PAD + dim];
                    if c < atom.simbox.lo(dim) || c >= atom.simbox.hi(dim) {
                        settled = false;
                    }
                }
            }
            if !self.rank.any(!settled) {
                return;
            }
        }
    }

    fn exchange_pass(&mut self, atom: &mut Atom) {
        for dim in 0..3 {
            if self.procgrid[dim] == 1 {
                continue;
            }
            let lo = atom.simbox.lo(dim);
            let hi = atom.simbox.hi(dim);
            let subwidth = self.prd[dim] / self.procgrid[dim] as f64;

            // ---------- pull leavers out of the owned range
            let mut buf: Vec<f64> = Vec::new();
            let mut i = 0;
            while i < atom.nlocal {
                let c = atom.x[i * PAD + dim];
                if c < lo || c >= hi {
                    if self.check_exchange && !self.do_safe_exchange {
                        let d = atom.simbox.min_image(c, 0.5 * (lo + hi), dim);
                        if d.abs() > 1.5 * subwidth {
                            warn!(
                                "atom moved further than one sub-box in dimension {}: {:.6}",
                                dim, c
                            );
                        }
                    }
                    atom.pack_exchange(i, &mut buf);
                    atom.copy(atom.nlocal - 1, i);
                    atom.nlocal -= 1;
                } else {
                    i += 1;
                }
            }

            // ---------- swap leavers with both face neighbors; each receiver
            // claims only the atoms that landed inside its own range
            let low = self.procneigh[dim][0];
            let high = self.procneigh[dim][1];
            self.rank.send(low, TAG_EXCHANGE, buf.clone());
            if self.procgrid[dim] > 2 {
                self.rank.send(high, TAG_EXCHANGE, buf);
            }
            let mut incoming = self.rank.recv(high, TAG_EXCHANGE);
            if self.procgrid[dim] > 2 {
                incoming.extend(self.rank.recv(low, TAG_EXCHANGE));
            }
            for chunk in incoming.chunks_exact(EXCHANGE_WIDTH) {
                let c = chunk[dim];
                if c >= lo && c < hi {
                    atom.unpack_exchange(chunk);
                }
            }
        }
    }

    /// Rebuilds the ghost region.
    ///
    /// For every swap the owned atoms (and previously acquired ghosts, which
    /// completes the box corners) lying inside the swap's slab are packed,
    /// shifted by the periodic image vector where the swap crosses a global
    /// face, and appended to the partner's ghost range. The send list of each
    /// swap is recorded for the forward and reverse passes.
    pub fn borders(&mut self, atom: &mut Atom) {
        atom.nghost = 0;
        let me = self.rank.me();
        for iswap in 0..self.nswap {
            let dim = self.swap_dim[iswap];
            let lo = self.slablo[iswap];
            let hi = self.slabhi[iswap];
            let shift = self.swap_shift(iswap);

            let mut list = std::mem::take(&mut self.sendlist[iswap]);
            list.clear();
            for i in 0..atom.nall() {
                let c = atom.x[i * PAD + dim];
                if c >= lo && c <= hi {
                    list.push(i);
                }
            }
            let mut buf: Vec<f64> = Vec::with_capacity(list.len() * BORDER_WIDTH);
            for &j in &list {
                atom.pack_border(j, shift, &mut buf);
            }
            self.sendnum[iswap] = list.len();
            self.sendlist[iswap] = list;

            let incoming = if self.sendproc[iswap] != me {
                self.rank.send(self.sendproc[iswap], TAG_BORDER, buf);
                self.rank.recv(self.recvproc[iswap], TAG_BORDER)
            } else {
                buf
            };

            let nrecv = incoming.len() / BORDER_WIDTH;
            let first = atom.nall();
            atom.ensure_capacity(first + nrecv);
            for (i, chunk) in incoming.chunks_exact(BORDER_WIDTH).enumerate() {
                atom.unpack_border(first + i, chunk);
            }
            self.recvnum[iswap] = nrecv;
            self.firstrecv[iswap] = first;
            atom.nghost += nrecv;
        }
    }

    /// Refreshes ghost images of a per-atom quantity without changing the
    /// ghost membership; replays the send lists recorded by `borders()`
    pub fn forward<P: CommPayload + ?Sized>(&mut self, payload: &mut P) {
        let me = self.rank.me();
        for iswap in 0..self.nswap {
            let shift = self.swap_shift(iswap);
            let mut buf = Vec::with_capacity(self.sendnum[iswap] * payload.width());
            payload.pack_forward(&self.sendlist[iswap], shift, &mut buf);
            let incoming = if self.sendproc[iswap] != me {
                self.rank.send(self.sendproc[iswap], TAG_FORWARD, buf);
                self.rank.recv(self.recvproc[iswap], TAG_FORWARD)
            } else {
                buf
            };
            payload.unpack_forward(self.firstrecv[iswap], self.recvnum[iswap], &incoming);
        }
    }

    /// Returns ghost contributions of a per-atom quantity to the owners,
    /// traversing the swaps in reverse order
    pub fn reverse<P: CommPayload + ?Sized>(&mut self, payload: &mut P) {
        let me = self.rank.me();
        for iswap in (0..self.nswap).rev() {
            let mut buf = Vec::with_capacity(self.recvnum[iswap] * payload.width());
            payload.pack_reverse(self.firstrecv[iswap], self.recvnum[iswap], &mut buf);
            let incoming = if self.sendproc[iswap] != me {
                self.rank.send(self.recvproc[iswap], TAG_REVERSE, buf);
                self.rank.recv(self.sendproc[iswap], TAG_REVERSE)
            } else {
                buf
            };
            payload.unpack_reverse(&self.sendlist[iswap], &incoming);
        }
    }

    fn swap_shift(&self, iswap: usize) -> [f64; 3] {
        if !self.pbc_any[iswap] {
            return [0.0; 3];
        }
        [
            self.pbc_flags[iswap][0] as f64 * self.prd[0],
            self.pbc_flags[iswap][1] as f64 * self.prd[1],
            self.pbc_flags[iswap][2] as f64 * self.prd[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use moldyn_system::{assert_close, SimBox};

    fn single_rank_comm() -> Comm {
        let mut ranks = Mesh::build(1);
        Comm::new(ranks.remove(0))
    }

    #[test]
    fn swap_plan_single_rank_test() {
        let mut comm = single_rank_comm();
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        comm.setup(2.5, &mut atom);

        assert_eq!(comm.procgrid, [1, 1, 1]);
        assert_eq!(comm.nswap, 6);
        // every swap is a periodic self-swap
        for iswap in 0..6 {
            assert_eq!(comm.sendproc[iswap], 0);
            assert!(comm.pbc_any[iswap]);
        }
        assert_eq!(comm.pbc_flags[0], [1, 0, 0]);
        assert_eq!(comm.pbc_flags[1], [-1, 0, 0]);
        assert_eq!(comm.pbc_flags[5], [0, 0, -1]);
        assert_close!(comm.slabhi[0], 2.5, 1e-12);
        assert_close!(comm.slablo[1], 7.5, 1e-12);
    }

    #[test]
    fn borders_periodic_images_test() {
        let mut comm = single_rank_comm();
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        comm.setup(2.5, &mut atom);

        // one atom near the low-x face, one in the middle
        atom.add_atom(1.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(5.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0);
        comm.borders(&mut atom);

        assert_eq!(atom.nghost, 1);
        assert_close!(atom.x[2 * PAD], 11.0, 1e-12);

        // forwarding after a move refreshes the image in place
        atom.x[0] = 1.25;
        let (nlocal, nghost) = (atom.nlocal, atom.nghost);
        comm.forward(&mut atom);
        assert_eq!((atom.nlocal, atom.nghost), (nlocal, nghost));
        assert_close!(atom.x[2 * PAD], 11.25, 1e-12);
    }

    #[test]
    fn reverse_accumulates_ghost_forces_test() {
        let mut comm = single_rank_comm();
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        comm.setup(2.5, &mut atom);
        atom.add_atom(1.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0);
        comm.borders(&mut atom);
        assert_eq!(atom.nghost, 1);

        atom.f[0] = 1.0;
        atom.f[PAD] = 0.5;
        comm.reverse(&mut atom);
        assert_close!(atom.f[0], 1.5, 1e-12);
    }

    #[test]
    fn tiny_cutoff_yields_no_ghosts_test() {
        let mut comm = single_rank_comm();
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        comm.setup(0.5, &mut atom);
        atom.add_atom(5.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0);
        comm.borders(&mut atom);
        assert_eq!(atom.nghost, 0);
    }

    #[test]
    fn exchange_wraps_and_keeps_atoms_test() {
        let mut comm = single_rank_comm();
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        comm.setup(2.5, &mut atom);
        atom.add_atom(-0.5, 5.0, 5.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(10.5, 5.0, 5.0, 0.0, 0.0, 0.0, 0);
        comm.exchange(&mut atom);
        assert_eq!(atom.nlocal, 2);
        assert_close!(atom.x[0], 9.5, 1e-12);
        assert_close!(atom.x[PAD], 0.5, 1e-12);
    }

    #[test]
    fn eight_rank_grid_test() {
        let ranks = Mesh::build(8);
        let grids: Vec<[usize; 3]> = std::thread::scope(|scope| {
            ranks
                .into_iter()
                .map(|rank| {
                    scope.spawn(move || {
                        let mut comm = Comm::new(rank);
                        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
                        comm.setup(2.0, &mut atom);
                        // migrate nothing, but exercise the full swap cycle
                        comm.exchange(&mut atom);
                        comm.borders(&mut atom);
                        comm.procgrid
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        for g in grids {
            assert_eq!(g, [2, 2, 2]);
        }
    }

    #[test]
    fn two_rank_migration_test() {
        let ranks = Mesh::build(2);
        let counts: Vec<usize> = std::thread::scope(|scope| {
            ranks
                .into_iter()
                .map(|rank| {
                    scope.spawn(move || {
                        let me = rank.me();
                        let mut comm = Comm::new(rank);
                        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
                        comm.setup(2.0, &mut atom);
                        // two ranks split the box along z; rank 0 owns z in [0, 5)
                        assert_eq!(comm.procgrid, [1, 1, 2]);
                        if me == 0 {
                            atom.add_atom(1.0, 1.0, 7.5, 0.0, 0.0, 0.0, 0);
                            atom.add_atom(1.0, 1.0, 2.5, 0.0, 0.0, 0.0, 0);
                        }
                        comm.exchange(&mut atom);
                        atom.nlocal
                    })
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });
        assert_eq!(counts, vec![1, 1]);
    }
}
