use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::atom::Atom;
use crate::simbox::SimBox;

/// Lattice constant of an FCC crystal of a given reduced density
pub fn fcc_lattice_constant(rho: f64) -> f64 {
    (4.0 / rho).powf(1.0 / 3.0)
}

/// Creates the global simulation box for `nx x ny x nz` FCC unit cells
/// at a given reduced density
pub fn create_box(nx: usize, ny: usize, nz: usize, rho: f64) -> SimBox {
    let alat = fcc_lattice_constant(rho);
    SimBox::new(nx as f64 * alat, ny as f64 * alat, nz as f64 * alat)
}

/// Fills the sub-box of this rank with its share of an FCC lattice.
///
/// Every rank walks only the lattice sites that may fall into its sub-box and
/// claims a site when its coordinates satisfy `lo <= c < hi` in all three
/// dimensions, so the union over ranks recreates the full `4 * nx * ny * nz`
/// atom crystal without duplicates. The initial velocity of each atom comes
/// from a `SmallRng` seeded with the global site index, which makes the
/// generated system independent of the rank decomposition.
///
/// # Arguments
/// * `atom` - the store to fill; its sub-box bounds must be final
/// * `nx`, `ny`, `nz` - number of FCC unit cells per box edge
/// * `rho` - reduced density of the crystal
pub fn create_atoms(atom: &mut Atom, nx: usize, ny: usize, nz: usize, rho: f64) {
    let alat = fcc_lattice_constant(rho);
    let half = 0.5 * alat;

    let site_range = |lo: f64, hi: f64, n2: i64| {
        let mut ilo = (lo / half) as i64 - 1;
        let mut ihi = (hi / half) as i64 + 1;
        ilo = ilo.max(0);
        ihi = ihi.min(n2 - 1);
        (ilo, ihi)
    };

    let (ilo, ihi) = site_range(atom.simbox.xlo, atom.simbox.xhi, 2 * nx as i64);
    let (jlo, jhi) = site_range(atom.simbox.ylo, atom.simbox.yhi, 2 * ny as i64);
    let (klo, khi) = site_range(atom.simbox.zlo, atom.simbox.zhi, 2 * nz as i64);

    for k in klo..=khi {
        for j in jlo..=jhi {
            for i in ilo..=ihi {
                if (i + j + k) % 2 != 0 {
                    continue;
                }
                let xtmp = half * i as f64;
                let ytmp = half * j as f64;
                let ztmp = half * k as f64;
                if xtmp < atom.simbox.xlo
                    || xtmp >= atom.simbox.xhi
                    || ytmp < atom.simbox.ylo
                    || ytmp >= atom.simbox.yhi
                    || ztmp < atom.simbox.zlo
                    || ztmp >= atom.simbox.zhi
                {
                    continue;
                }

                // --- global site index seeds the velocity draw
                let site =
                    (k * (2 * ny as i64) * (2 * nx as i64) + j * (2 * nx as i64) + i) as u64;
                let mut rng = SmallRng::seed_from_u64(site);
                let vx: f64 = rng.sample(StandardNormal);
                let vy: f64 = rng.sample(StandardNormal);
                let vz: f64 = rng.sample(StandardNormal);

                atom.add_atom(xtmp, ytmp, ztmp, vx, vy, vz, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;

    #[test]
    fn fcc_count_test() {
        let simbox = create_box(3, 3, 3, 0.8442);
        let mut atom = Atom::new(simbox);
        create_atoms(&mut atom, 3, 3, 3, 0.8442);
        assert_eq!(atom.nlocal, 4 * 3 * 3 * 3);
    }

    #[test]
    fn fcc_density_test() {
        let rho = 0.8442;
        let simbox = create_box(4, 4, 4, rho);
        let n = 4 * 4 * 4 * 4;
        assert_close!(n as f64 / simbox.volume(), rho, 1e-10);
    }

    #[test]
    fn decomposition_independence_test() {
        // one rank owning the whole box ...
        let simbox = create_box(2, 2, 2, 0.8442);
        let mut whole = Atom::new(simbox.clone());
        create_atoms(&mut whole, 2, 2, 2, 0.8442);

        // ... against two half-boxes split along x
        let mut left = Atom::new(simbox.clone());
        left.simbox.set_bounds(0, 0.0, simbox.xprd / 2.0);
        create_atoms(&mut left, 2, 2, 2, 0.8442);
        let mut right = Atom::new(simbox.clone());
        right.simbox.set_bounds(0, simbox.xprd / 2.0, simbox.xprd);
        create_atoms(&mut right, 2, 2, 2, 0.8442);

        assert_eq!(whole.nlocal, left.nlocal + right.nlocal);

        let collect = |a: &Atom| {
            let mut rows: Vec<[i64; 6]> = (0..a.nlocal)
                .map(|i| {
                    [
                        (a.x[i * crate::PAD] * 1e9) as i64,
                        (a.x[i * crate::PAD + 1] * 1e9) as i64,
                        (a.x[i * crate::PAD + 2] * 1e9) as i64,
                        (a.v[i * crate::PAD] * 1e9) as i64,
                        (a.v[i * crate::PAD + 1] * 1e9) as i64,
                        (a.v[i * crate::PAD + 2] * 1e9) as i64,
                    ]
                })
                .collect();
            rows.sort();
            rows
        };
        let mut split = collect(&left);
        split.extend(collect(&right));
        split.sort();
        assert_eq!(collect(&whole), split);
    }
}
