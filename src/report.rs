use std::fs::File;
use std::io::{stderr, stdout, Write};

use crate::input::{ForceKind, RunInput};
use crate::run::{RunConfig, RunSummary};

/// Opens the destination of a report.
///
/// The names `"stdout"` and `"stderr"` (and the empty name) select the
/// respective stream; anything else is treated as a file path. Failures are
/// returned to the caller, which decides how the run ends.
///
/// # Arguments
/// * `out_fname` - file path, `"stdout"` or `"stderr"`
/// * `if_append` - existing file content is kept when true
pub fn out_writer(out_fname: &str, if_append: bool) -> std::io::Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = match out_fname {
        "" | "stdout" => Box::new(stdout()),
        "stderr" => Box::new(stderr()),
        path => {
            let mut options = File::options();
            if if_append {
                options.append(true).create(true);
            } else {
                options.write(true).create(true).truncate(true);
            }
            Box::new(options.open(path)?)
        }
    };
    Ok(writer)
}

/// Writes the post-run YAML report: run settings, physics parameters,
/// technical knobs, the thermo history and the timer breakdown.
pub fn write_yaml(
    w: &mut dyn Write,
    cfg: &RunConfig,
    summary: &RunSummary,
) -> std::io::Result<()> {
    let input: &RunInput = &cfg.input;
    writeln!(w, "run_settings:")?;
    writeln!(w, "  ranks: {}", summary.ranks)?;
    writeln!(w, "  threads_per_rank: {}", summary.num_threads)?;
    writeln!(
        w,
        "  datafile: {}",
        input.datafile.as_deref().unwrap_or("none")
    )?;
    writeln!(w, "physics:")?;
    writeln!(
        w,
        "  force_style: {}",
        match input.forcetype {
            ForceKind::Lj => "lj",
            ForceKind::Eam => "eam",
        }
    )?;
    writeln!(w, "  epsilon: {}", input.epsilon)?;
    writeln!(w, "  sigma: {}", input.sigma)?;
    writeln!(
        w,
        "  units: {}",
        if input.units == moldyn_sim::Units::Lj {
            "lj"
        } else {
            "metal"
        }
    )?;
    writeln!(w, "  natoms: {}", summary.natoms)?;
    writeln!(w, "  unit_cells: [{}, {}, {}]", input.nx, input.ny, input.nz)?;
    writeln!(w, "  density: {}", input.rho)?;
    writeln!(w, "  force_cutoff: {}", input.force_cut)?;
    writeln!(w, "  timestep: {}", input.dt)?;
    writeln!(w, "  nsteps: {}", input.ntimes)?;
    writeln!(w, "technical:")?;
    writeln!(w, "  neighbor_cutoff: {}", input.neigh_cut)?;
    writeln!(w, "  half_neighbor_lists: {}", cfg.halfneigh)?;
    writeln!(w, "  ghost_newton: {}", summary.ghost_newton)?;
    writeln!(w, "  neighbor_frequency: {}", input.neigh_every)?;
    writeln!(w, "  thermo_frequency: {}", input.thermo_nstat)?;
    writeln!(w, "  safe_exchange: {}", cfg.safe_exchange)?;
    writeln!(w, "thermo:")?;
    for (i, step) in summary.steps.iter().enumerate() {
        writeln!(
            w,
            "  - [{}, {:.6e}, {:.6e}, {:.6e}]",
            step, summary.temperatures[i], summary.energies[i], summary.pressures[i]
        )?;
    }
    writeln!(w, "timers:")?;
    writeln!(w, "  total: {:.6}", summary.timer.total)?;
    writeln!(w, "  force: {:.6}", summary.timer.force)?;
    writeln!(w, "  neighbor: {:.6}", summary.timer.neigh)?;
    writeln!(w, "  comm: {:.6}", summary.timer.comm)?;
    writeln!(w, "  other: {:.6}", summary.timer.other())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_writer_streams_test() {
        assert!(out_writer("", false).is_ok());
        assert!(out_writer("stdout", true).is_ok());
        assert!(out_writer("stderr", false).is_ok());
        // no file named after the stream appears
        assert!(std::fs::metadata("stdout").is_err());
    }

    #[test]
    fn out_writer_file_test() {
        let path = std::env::temp_dir().join("moldyn_report_test.yaml");
        let name = path.display().to_string();
        {
            let mut w = out_writer(&name, false).unwrap();
            w.write_all(b"thermo:\n").unwrap();
        }
        {
            let mut w = out_writer(&name, true).unwrap();
            w.write_all(b"  - [0, 1.0, -6.0, -5.0]\n").unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(contents.starts_with("thermo:\n"));
        assert!(contents.lines().count() == 2);
    }

    #[test]
    fn out_writer_reports_failure_test() {
        let path = std::env::temp_dir().join("moldyn_missing_dir/report.yaml");
        assert!(out_writer(&path.display().to_string(), false).is_err());
    }
}
