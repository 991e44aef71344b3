use std::thread;

use moldyn_comm::{Comm, Mesh, Rank};
use moldyn_force::{read_funcfl, Force, ForceEam, ForceLj, Funcfl};
use moldyn_neighbor::Neighbor;
use moldyn_sim::{Integrate, Thermo, Timer};
use moldyn_system::{create_atoms, create_box, read_lammps_data, Atom, DataFile, PAD};

use crate::input::{ForceKind, RunInput};
use crate::MoldynError;

/// DYNAMO table the EAM force style loads, as in the reference benchmark
pub const EAM_POTENTIAL_FILE: &str = "Cu_u6.eam";

/// Everything a run needs beyond the input file: the process layout and the
/// technical knobs of the command line
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub input: RunInput,
    /// number of spatial-decomposition ranks
    pub ranks: usize,
    /// worker threads per rank
    pub num_threads: usize,
    pub halfneigh: bool,
    pub ghost_newton: bool,
    /// bins per box edge; derived from the system when absent
    pub neigh_bins: Option<usize>,
    /// bin-sort cadence; the reneighboring cadence when absent, 0 disables
    pub sort_every: Option<usize>,
    pub check_exchange: bool,
    pub safe_exchange: bool,
    /// EAM potential table; [`EAM_POTENTIAL_FILE`] when absent
    pub potential_file: Option<String>,
    /// suppress the banner and per-sample lines
    pub quiet: bool,
}

impl RunConfig {
    pub fn new(input: RunInput) -> RunConfig {
        RunConfig {
            input,
            ranks: 1,
            num_threads: 1,
            halfneigh: false,
            ghost_newton: true,
            neigh_bins: None,
            sort_every: None,
            check_exchange: false,
            safe_exchange: false,
            potential_file: None,
            quiet: false,
        }
    }
}

/// Result of a finished run: the thermo history of rank 0, the phase timers,
/// and the owned positions of every rank concatenated in rank order
pub struct RunSummary {
    pub natoms: usize,
    pub ranks: usize,
    pub num_threads: usize,
    pub ghost_newton: bool,
    pub steps: Vec<usize>,
    pub temperatures: Vec<f64>,
    pub energies: Vec<f64>,
    pub pressures: Vec<f64>,
    pub timer: Timer,
    pub positions: Vec<[f64; 3]>,
}

struct Shared {
    cfg: RunConfig,
    data: Option<DataFile>,
    funcfl: Option<Funcfl>,
}

struct RankResult {
    thermo: Option<(Vec<usize>, Vec<f64>, Vec<f64>, Vec<f64>)>,
    timer: Timer,
    positions: Vec<[f64; 3]>,
}

/// Runs a complete simulation: spawns one thread per rank, joins them and
/// folds the per-rank results together.
pub fn run_simulation(cfg: &RunConfig) -> Result<RunSummary, MoldynError> {
    let mut cfg = cfg.clone();

    // ---------- the EAM half-list bookkeeping owns its ghost contributions
    if cfg.input.forcetype == ForceKind::Eam && cfg.ghost_newton {
        if !cfg.quiet {
            println!("# EAM runs with ghost_newton off; changing the setting now.");
        }
        cfg.ghost_newton = false;
    }

    let funcfl = match cfg.input.forcetype {
        ForceKind::Eam => Some(read_funcfl(
            cfg.potential_file.as_deref().unwrap_or(EAM_POTENTIAL_FILE),
        )?),
        ForceKind::Lj => None,
    };
    let data = match &cfg.input.datafile {
        Some(path) => Some(read_lammps_data(path)?),
        None => None,
    };

    let shared = Shared { cfg, data, funcfl };
    let ranks = Mesh::build(shared.cfg.ranks);

    let results: Vec<RankResult> = thread::scope(|scope| {
        let shared = &shared;
        ranks
            .into_iter()
            .map(|rank| scope.spawn(move || run_rank(rank, shared)))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().expect("rank thread panicked"))
            .collect()
    });

    let mut positions = Vec::new();
    for r in &results {
        positions.extend_from_slice(&r.positions);
    }
    let (steps, temperatures, energies, pressures) = results[0]
        .thermo
        .clone()
        .expect("rank 0 keeps the thermo history");
    let timer = results[0].timer.clone();
    let natoms = positions.len();
    let input = &shared.cfg.input;

    if !shared.cfg.quiet {
        let perf = if timer.total > 0.0 {
            natoms as f64 * input.ntimes as f64 / timer.total
        } else {
            0.0
        };
        println!();
        println!("# Performance Summary:");
        println!("# ranks threads nsteps natoms t_total t_force t_neigh t_comm t_other performance perf/thread");
        println!(
            "{} {} {} {} {:.6} {:.6} {:.6} {:.6} {:.6} {:.2} {:.2}",
            shared.cfg.ranks,
            shared.cfg.num_threads,
            input.ntimes,
            natoms,
            timer.total,
            timer.force,
            timer.neigh,
            timer.comm,
            timer.other(),
            perf,
            perf / (shared.cfg.ranks * shared.cfg.num_threads) as f64,
        );
    }

    Ok(RunSummary {
        natoms,
        ranks: shared.cfg.ranks,
        num_threads: shared.cfg.num_threads,
        ghost_newton: shared.cfg.ghost_newton,
        steps,
        temperatures,
        energies,
        pressures,
        timer,
        positions,
    })
}

fn run_rank(rank: Rank, shared: &Shared) -> RankResult {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(shared.cfg.num_threads)
        .build()
        .expect("can't build the worker pool of a rank");
    pool.install(|| run_rank_inner(rank, shared))
}

fn run_rank_inner(rank: Rank, shared: &Shared) -> RankResult {
    let cfg = &shared.cfg;
    let input = &cfg.input;
    let me = rank.me();

    // ---------- global box, then the sub-box of this rank
    let simbox = match &shared.data {
        Some(d) => d.simbox.clone(),
        None => create_box(input.nx, input.ny, input.nz, input.rho),
    };
    let mut atom = Atom::new(simbox);
    let mut comm = Comm::new(rank);
    comm.check_exchange = cfg.check_exchange;
    comm.do_safe_exchange = cfg.safe_exchange;

    let mut force = match input.forcetype {
        ForceKind::Lj => Force::Lj(ForceLj::new(input.force_cut, input.epsilon, input.sigma)),
        ForceKind::Eam => {
            let table = shared
                .funcfl
                .as_ref()
                .expect("EAM run without a loaded potential table");
            Force::Eam(ForceEam::from_table(table))
        }
    };
    if let Some(mass) = force.mass() {
        atom.mass = mass;
    }

    let cutneigh = input.neigh_cut;
    comm.setup(cutneigh, &mut atom);

    let (nbinx, nbiny, nbinz) = neighbor_bins(cfg, &atom, cutneigh);
    let mut neighbor = Neighbor::new(
        cutneigh,
        input.neigh_every,
        nbinx,
        nbiny,
        nbinz,
        cfg.halfneigh,
        cfg.ghost_newton,
    );
    neighbor.setup(&atom);

    let sort_every = cfg.sort_every.unwrap_or(input.neigh_every);
    let mut integrate = Integrate::new(input.ntimes, input.dt, sort_every);
    integrate.set_skin((cutneigh - force.cutforce()).max(0.0));

    // ---------- populate the box
    match &shared.data {
        Some(d) => {
            if me == 0 {
                for i in 0..d.natoms {
                    atom.add_atom(
                        d.positions[i][0],
                        d.positions[i][1],
                        d.positions[i][2],
                        d.velocities[i][0],
                        d.velocities[i][1],
                        d.velocities[i][2],
                        d.types[i],
                    );
                }
            }
            atom.natoms = d.natoms;
            // every atom starts on rank 0; let migration passes settle them
            let saved = comm.do_safe_exchange;
            comm.do_safe_exchange = true;
            comm.exchange(&mut atom);
            comm.do_safe_exchange = saved;
        }
        None => {
            create_atoms(&mut atom, input.nx, input.ny, input.nz, input.rho);
            atom.natoms = comm.sum_usize(atom.nlocal);
        }
    }
    let rho = match &shared.data {
        Some(d) => d.natoms as f64 / atom.simbox.volume(),
        None => input.rho,
    };

    let mut thermo = Thermo::new(input.thermo_nstat, input.ntimes);
    thermo.setup(rho, &mut integrate, &atom, input.units);
    if shared.data.is_none() {
        thermo.create_velocity(input.t_request, &mut atom, &mut comm);
    }

    if me == 0 && !cfg.quiet {
        print_banner(shared, &atom, &neighbor, &force, &thermo, sort_every);
    }

    // ---------- initial decomposition, forces and thermo sample
    comm.exchange(&mut atom);
    comm.borders(&mut atom);
    neighbor.build(&atom);

    let mut timer = Timer::new();
    let nall = atom.nall();
    atom.f[..nall * PAD].fill(0.0);
    force.set_evflag(true);
    force.compute(&mut atom, &neighbor, &mut comm);
    if neighbor.halfneigh && neighbor.ghost_newton {
        comm.reverse(&mut atom);
    }
    if me == 0 && !cfg.quiet {
        println!("# Timestep T U P Time");
    }
    thermo.quiet = cfg.quiet;
    thermo.compute(0, &atom, &neighbor, &force, &mut comm, &timer);

    integrate.run(
        &mut atom,
        &mut force,
        &mut neighbor,
        &mut comm,
        &mut thermo,
        &mut timer,
    );

    // ---------- final sample, in case the cadence missed the last step
    let nall = atom.nall();
    atom.f[..nall * PAD].fill(0.0);
    force.set_evflag(true);
    force.compute(&mut atom, &neighbor, &mut comm);
    if neighbor.halfneigh && neighbor.ghost_newton {
        comm.reverse(&mut atom);
    }
    thermo.compute(-1, &atom, &neighbor, &force, &mut comm, &timer);

    let positions: Vec<[f64; 3]> = (0..atom.nlocal)
        .map(|i| {
            [
                atom.x[i * PAD],
                atom.x[i * PAD + 1],
                atom.x[i * PAD + 2],
            ]
        })
        .collect();
    RankResult {
        thermo: if me == 0 {
            Some((
                thermo.steps.clone(),
                thermo.temperatures.clone(),
                thermo.energies.clone(),
                thermo.pressures.clone(),
            ))
        } else {
            None
        },
        timer,
        positions,
    }
}

/// Bin counts per box edge: the command-line override, or 5/6 of the unit
/// cells for lattice runs, or the same heuristic re-expressed against the
/// box for data-file runs
fn neighbor_bins(cfg: &RunConfig, atom: &Atom, cutneigh: f64) -> (usize, usize, usize) {
    if let Some(b) = cfg.neigh_bins {
        return (b.max(1), b.max(1), b.max(1));
    }
    if cfg.input.datafile.is_some() {
        let count = |prd: f64| (((5.0 / 6.0) * prd / (cutneigh / 2.0)) as usize).max(1);
        return (
            count(atom.simbox.xprd),
            count(atom.simbox.yprd),
            count(atom.simbox.zprd),
        );
    }
    let scale = 5.0 / 6.0;
    (
        ((scale * cfg.input.nx as f64) as usize).max(1),
        ((scale * cfg.input.ny as f64) as usize).max(1),
        ((scale * cfg.input.nz as f64) as usize).max(1),
    )
}

fn print_banner(
    shared: &Shared,
    atom: &Atom,
    neighbor: &Neighbor,
    force: &Force,
    thermo: &Thermo,
    sort_every: usize,
) {
    let cfg = &shared.cfg;
    let input = &cfg.input;
    println!("# moldyn output ...");
    println!("# Run Settings:");
    println!("\t# Ranks: {}", cfg.ranks);
    println!("\t# Threads per rank: {}", cfg.num_threads);
    println!(
        "\t# Datafile: {}",
        input.datafile.as_deref().unwrap_or("None")
    );
    println!("# Physics Settings:");
    println!("\t# ForceStyle: {}", force.name());
    println!(
        "\t# Force Parameters: {:2.2} {:2.2}",
        input.epsilon, input.sigma
    );
    println!(
        "\t# Units: {}",
        if input.units == moldyn_sim::Units::Lj {
            "LJ"
        } else {
            "METAL"
        }
    );
    println!("\t# Atoms: {}", atom.natoms);
    println!(
        "\t# System size: {:2.2} {:2.2} {:2.2} (unit cells: {} {} {})",
        atom.simbox.xprd, atom.simbox.yprd, atom.simbox.zprd, input.nx, input.ny, input.nz
    );
    println!("\t# Density: {:.6}", thermo.density());
    println!("\t# Force cutoff: {:.6}", force.cutforce());
    println!("\t# Timestep size: {:.6}", input.dt);
    println!("# Technical Settings:");
    println!("\t# Neigh cutoff: {:.6}", neighbor.cutneigh);
    println!("\t# Half neighborlists: {}", cfg.halfneigh as i32);
    println!(
        "\t# Neighbor bins: {} {} {}",
        neighbor.nbinx, neighbor.nbiny, neighbor.nbinz
    );
    println!("\t# Neighbor frequency: {}", neighbor.every);
    println!("\t# Sorting frequency: {}", sort_every);
    println!("\t# Thermo frequency: {}", input.thermo_nstat);
    println!("\t# Ghost Newton: {}", cfg.ghost_newton as i32);
    println!("\t# Safe exchange: {}", cfg.safe_exchange as i32);
}
