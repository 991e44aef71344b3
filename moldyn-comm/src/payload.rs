use moldyn_system::{Atom, PAD};

/// Per-atom data that can ride the recorded halo swaps.
///
/// `Comm` knows which atoms each swap sends and where their images live; a
/// payload owner only packs and unpacks values. The atom store implements the
/// protocol for positions (forward) and forces (reverse); a potential may
/// implement it for its own per-atom quantities, such as the EAM embedding
/// derivative, without `Comm` learning anything about the potential.
pub trait CommPayload {
    /// Number of values packed per atom
    fn width(&self) -> usize;

    /// Appends the values of the listed atoms, shifted by the periodic image
    /// vector of the swap where that applies
    fn pack_forward(&self, list: &[usize], shift: [f64; 3], buf: &mut Vec<f64>);

    /// Stores `n` incoming images starting at atom slot `first`
    fn unpack_forward(&mut self, first: usize, n: usize, buf: &[f64]);

    /// Appends the values of `n` ghost slots starting at `first`
    fn pack_reverse(&self, first: usize, n: usize, buf: &mut Vec<f64>);

    /// Accumulates returned ghost contributions onto the listed owned atoms
    fn unpack_reverse(&mut self, list: &[usize], buf: &[f64]);
}

impl CommPayload for Atom {
    fn width(&self) -> usize {
        PAD
    }

    fn pack_forward(&self, list: &[usize], shift: [f64; 3], buf: &mut Vec<f64>) {
        for &j in list {
            for d in 0..PAD {
                buf.push(self.x[j * PAD + d] + shift[d]);
            }
        }
    }

    fn unpack_forward(&mut self, first: usize, n: usize, buf: &[f64]) {
        for i in 0..n {
            for d in 0..PAD {
                self.x[(first + i) * PAD + d] = buf[i * PAD + d];
            }
        }
    }

    fn pack_reverse(&self, first: usize, n: usize, buf: &mut Vec<f64>) {
        for i in 0..n {
            for d in 0..PAD {
                buf.push(self.f[(first + i) * PAD + d]);
            }
        }
    }

    fn unpack_reverse(&mut self, list: &[usize], buf: &[f64]) {
        for (i, &j) in list.iter().enumerate() {
            for d in 0..PAD {
                self.f[j * PAD + d] += buf[i * PAD + d];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moldyn_system::{assert_close, SimBox};

    #[test]
    fn position_pack_roundtrip_test() {
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        atom.add_atom(1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0);
        atom.add_atom(9.0, 2.0, 3.0, 0.0, 0.0, 0.0, 0);

        let mut buf = Vec::new();
        atom.pack_forward(&[1, 0], [-10.0, 0.0, 0.0], &mut buf);
        assert_eq!(buf.len(), 2 * PAD);
        assert_close!(buf[0], -1.0, 1e-12);

        atom.ensure_capacity(4);
        atom.nghost = 2;
        atom.unpack_forward(2, 2, &buf);
        assert_close!(atom.x[2 * PAD], -1.0, 1e-12);
        assert_close!(atom.x[3 * PAD], -9.0, 1e-12);
    }

    #[test]
    fn force_reverse_accumulation_test() {
        let mut atom = Atom::new(SimBox::new(10.0, 10.0, 10.0));
        atom.add_atom(1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0);
        atom.ensure_capacity(2);
        atom.nghost = 1;
        atom.f[0] = 0.5;
        atom.f[PAD] = 0.25; // ghost slot

        let mut buf = Vec::new();
        atom.pack_reverse(1, 1, &mut buf);
        atom.unpack_reverse(&[0], &buf);
        assert_close!(atom.f[0], 0.75, 1e-12);
    }
}
