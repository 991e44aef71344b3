use std::env;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use moldyn::input::{read_input, ForceKind, RunInput};
use moldyn::report::{out_writer, write_yaml};
use moldyn::run::{run_simulation, RunConfig};
use moldyn_sim::Units;

#[derive(Parser, Debug)]
#[clap(name = "moldyn")]
#[clap(version = "0.3")]
#[clap(about = "Parallel short-range molecular dynamics benchmark", long_about = None)]
struct Args {
    /// number of spatial-decomposition ranks
    #[clap(short = 'r', long, default_value_t = 1)]
    ranks: usize,
    /// number of worker threads per rank
    #[clap(short = 't', long = "num_threads", default_value_t = 1)]
    num_threads: usize,
    /// input file with the scenario description
    #[clap(short = 'i', long = "input_file", default_value = "in.lj.moldyn")]
    input_file: String,
    /// number of timesteps (overrides the input file)
    #[clap(short = 'n', long)]
    nsteps: Option<usize>,
    /// linear dimension of the system box, in unit cells
    #[clap(short = 's', long)]
    size: Option<usize>,
    /// unit cells in the x direction
    #[clap(long)]
    nx: Option<usize>,
    /// unit cells in the y direction
    #[clap(long)]
    ny: Option<usize>,
    /// unit cells in the z direction
    #[clap(long)]
    nz: Option<usize>,
    /// linear dimension of the neighbor bin grid
    #[clap(short = 'b', long = "neigh_bins")]
    neigh_bins: Option<usize>,
    /// read the starting configuration from a LAMMPS data file
    #[clap(short = 'f', long = "data_file")]
    data_file: Option<String>,
    /// unit system (lj or metal)
    #[clap(short = 'u', long)]
    units: Option<String>,
    /// interaction model (lj or eam)
    #[clap(short = 'p', long = "force")]
    force: Option<String>,
    /// use half neighbor lists (0: full, 1: half)
    #[clap(long = "half_neigh", default_value_t = 0)]
    half_neigh: i32,
    /// apply Newton's third law across ghost atoms (half lists only)
    #[clap(long = "ghost_newton", default_value_t = 1)]
    ghost_newton: i32,
    /// warn when an atom moves further than one sub-box between exchanges
    #[clap(long = "check_exchange")]
    check_exchange: bool,
    /// migrate atoms with repeated passes, allowing moves over several sub-boxes
    #[clap(long = "safe_exchange")]
    safe_exchange: bool,
    /// re-sort atoms into bin order every this many steps (0: never)
    #[clap(long)]
    sort: Option<usize>,
    /// level of yaml output
    #[clap(short = 'o', long = "yaml_output", default_value_t = 0)]
    yaml_output: usize,
    /// write yaml output also to the screen
    #[clap(long = "yaml_screen")]
    yaml_screen: bool,
    /// suppress the banner, thermo lines and performance summary
    #[clap(long, short = 'q')]
    quiet: bool,
}

fn main() -> ExitCode {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    env_logger::init();

    let args = Args::parse();

    // ---------- scenario from the input file, then the command-line overrides
    let mut input: RunInput = match read_input(&args.input_file) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("moldyn: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(n) = args.nsteps {
        input.ntimes = n;
    }
    if let Some(s) = args.size {
        input.nx = s;
        input.ny = s;
        input.nz = s;
    }
    if let Some(nx) = args.nx {
        input.nx = nx;
        if args.size.is_none() {
            input.ny = args.ny.unwrap_or(nx);
            input.nz = args.nz.unwrap_or(nx);
        }
    }
    if let Some(ny) = args.ny {
        input.ny = ny;
    }
    if let Some(nz) = args.nz {
        input.nz = nz;
    }
    if args.data_file.is_some() {
        input.datafile = args.data_file.clone();
    }
    if let Some(units) = &args.units {
        input.units = match units.as_str() {
            "metal" => Units::Metal,
            _ => Units::Lj,
        };
    }
    if let Some(force) = &args.force {
        input.forcetype = match force.as_str() {
            "eam" => ForceKind::Eam,
            _ => ForceKind::Lj,
        };
    }

    let mut cfg = RunConfig::new(input);
    cfg.ranks = args.ranks.max(1);
    cfg.num_threads = args.num_threads.max(1);
    cfg.halfneigh = args.half_neigh != 0;
    cfg.ghost_newton = args.ghost_newton != 0;
    cfg.neigh_bins = args.neigh_bins;
    cfg.sort_every = args.sort;
    cfg.check_exchange = args.check_exchange;
    cfg.safe_exchange = args.safe_exchange;
    cfg.quiet = args.quiet;

    info!(
        "starting dynamics: {} ranks, {} threads per rank",
        cfg.ranks, cfg.num_threads
    );
    let summary = match run_simulation(&cfg) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("moldyn: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.yaml_output > 0 {
        let report = out_writer("moldyn.yaml", false)
            .and_then(|mut writer| write_yaml(&mut *writer, &cfg, &summary));
        if let Err(e) = report {
            eprintln!("moldyn: can't write the yaml report: {}", e);
            return ExitCode::FAILURE;
        }
        if args.yaml_screen {
            let screen = out_writer("stdout", true)
                .and_then(|mut writer| write_yaml(&mut *writer, &cfg, &summary));
            if let Err(e) = screen {
                eprintln!("moldyn: can't write the yaml report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
