use moldyn::input::RunInput;
use moldyn::run::{run_simulation, RunConfig, RunSummary};

/// Small Lennard-Jones liquid scenario used by the single-rank checks
fn small_lj_input() -> RunInput {
    RunInput {
        nx: 4,
        ny: 4,
        nz: 4,
        ntimes: 100,
        thermo_nstat: 10,
        ..RunInput::default()
    }
}

fn quiet_config(input: RunInput) -> RunConfig {
    let mut cfg = RunConfig::new(input);
    cfg.quiet = true;
    cfg
}

/// Total energy per atom of a thermo sample: potential plus kinetic
fn total_energy(summary: &RunSummary, sample: usize) -> f64 {
    let n = summary.natoms as f64;
    let kinetic = 0.5 * summary.temperatures[sample] * (3.0 * n - 3.0) / n;
    summary.energies[sample] + kinetic
}

fn sorted_positions(summary: &RunSummary) -> Vec<[f64; 3]> {
    let mut out = summary.positions.clone();
    out.sort_by(|a, b| {
        a[0].total_cmp(&b[0])
            .then(a[1].total_cmp(&b[1]))
            .then(a[2].total_cmp(&b[2]))
    });
    out
}

fn assert_trajectories_match(a: &RunSummary, b: &RunSummary, tolerance: f64) {
    assert_eq!(a.natoms, b.natoms);
    let pa = sorted_positions(a);
    let pb = sorted_positions(b);
    for (ra, rb) in pa.iter().zip(pb.iter()) {
        for d in 0..3 {
            assert!(
                (ra[d] - rb[d]).abs() < tolerance,
                "positions diverged: {:?} vs {:?}",
                ra,
                rb
            );
        }
    }
}

#[test]
fn nve_energy_drift_test() {
    let summary = run_simulation(&quiet_config(small_lj_input())).unwrap();
    assert_eq!(summary.natoms, 4 * 4 * 4 * 4);
    assert!(summary.steps.len() > 2);

    let e0 = total_energy(&summary, 0);
    for sample in 1..summary.steps.len() {
        let drift = (total_energy(&summary, sample) - e0).abs() / e0.abs();
        assert!(
            drift < 1e-3,
            "energy drifted by {} at step {}",
            drift,
            summary.steps[sample]
        );
    }
}

#[test]
fn newton_sum_is_reflected_in_momentum_test() {
    // with forces summing to zero the total momentum stays put; velocities
    // start with the center-of-mass motion removed, so each thermo sample
    // must keep the temperature finite and positive
    let summary = run_simulation(&quiet_config(small_lj_input())).unwrap();
    for &t in &summary.temperatures {
        assert!(t.is_finite() && t > 0.0);
    }
    for &p in &summary.pressures {
        assert!(p.is_finite());
    }
}

#[test]
fn half_with_ghost_newton_matches_full_test() {
    let mut input = small_lj_input();
    input.ntimes = 10;
    input.neigh_every = 5;
    input.thermo_nstat = 10;

    let full = run_simulation(&quiet_config(input.clone())).unwrap();

    let mut half_cfg = quiet_config(input.clone());
    half_cfg.halfneigh = true;
    half_cfg.ghost_newton = true;
    let half = run_simulation(&half_cfg).unwrap();

    assert_trajectories_match(&full, &half, 1e-8);
    let last = full.energies.len() - 1;
    assert!((full.energies[last] - half.energies[half.energies.len() - 1]).abs() < 1e-9);
    assert!(
        (full.pressures[last] - half.pressures[half.pressures.len() - 1]).abs() < 1e-6
    );
}

#[test]
fn half_without_ghost_newton_matches_full_test() {
    let mut input = small_lj_input();
    input.ntimes = 10;
    input.neigh_every = 5;

    let full = run_simulation(&quiet_config(input.clone())).unwrap();

    let mut half_cfg = quiet_config(input);
    half_cfg.halfneigh = true;
    half_cfg.ghost_newton = false;
    let half = run_simulation(&half_cfg).unwrap();

    assert_trajectories_match(&full, &half, 1e-8);
}

#[test]
fn rebuild_stress_test() {
    // a skin so thin that the displacement trigger rebuilds almost every
    // step must reproduce the rebuild-every-step trajectory
    let mut thin_skin = small_lj_input();
    thin_skin.ntimes = 25;
    thin_skin.neigh_every = 20;
    thin_skin.neigh_cut = thin_skin.force_cut + 0.01;

    let mut every_step = small_lj_input();
    every_step.ntimes = 25;
    every_step.neigh_every = 1;

    let a = run_simulation(&quiet_config(thin_skin)).unwrap();
    let b = run_simulation(&quiet_config(every_step)).unwrap();
    assert_trajectories_match(&a, &b, 1e-6);
}

#[test]
fn bin_sort_keeps_physics_test() {
    let mut input = small_lj_input();
    input.ntimes = 20;
    input.neigh_every = 5;

    let unsorted_cfg = {
        let mut cfg = quiet_config(input.clone());
        cfg.sort_every = Some(0);
        cfg
    };
    let sorted_cfg = {
        let mut cfg = quiet_config(input);
        cfg.sort_every = Some(5);
        cfg
    };

    let a = run_simulation(&unsorted_cfg).unwrap();
    let b = run_simulation(&sorted_cfg).unwrap();
    assert_trajectories_match(&a, &b, 1e-6);
}

#[test]
fn threaded_workers_match_serial_test() {
    let mut input = small_lj_input();
    input.ntimes = 10;

    let serial = run_simulation(&quiet_config(input.clone())).unwrap();

    let mut threaded_cfg = quiet_config(input.clone());
    threaded_cfg.num_threads = 4;
    let threaded = run_simulation(&threaded_cfg).unwrap();
    assert_trajectories_match(&serial, &threaded, 1e-6);

    // the half-list shadow-array kernel under the same worker count
    let mut half_threaded_cfg = quiet_config(input);
    half_threaded_cfg.num_threads = 4;
    half_threaded_cfg.halfneigh = true;
    half_threaded_cfg.ghost_newton = true;
    let half_threaded = run_simulation(&half_threaded_cfg).unwrap();
    assert_trajectories_match(&serial, &half_threaded, 1e-6);
}
