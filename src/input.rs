use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use moldyn_sim::Units;

/// Errors that may be thrown while reading the simulation input file
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InputError {
    #[error("Can't open input file: {file_name}")]
    FileNotFound { file_name: String },
    #[error("Input file ended before the '{what}' line")]
    MissingLine { what: String },
    #[error("The following entry: '{value}' can't be parsed; the problematic line was: {line}")]
    CantParseEntry { line: String, value: String },
    #[error("Unknown keyword '{value}' in input line: {line}")]
    UnknownKeyword { line: String, value: String },
    #[error("General I/O error occurred while reading an input file")]
    Io(#[from] std::io::Error),
}

/// Interaction model requested by a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForceKind {
    Lj,
    Eam,
}

/// Scenario description read from the line-oriented input file.
///
/// The line order is fixed: units, data file (or `none`), force style, force
/// parameters (epsilon and sigma), box repeats, timesteps, timestep size,
/// initial temperature, density, reneighboring cadence, force cutoff and
/// neighbor skin, thermo cadence. The first line is a free comment and blank
/// lines are ignored. The stored `neigh_cut` already includes the skin.
#[derive(Clone, Debug)]
pub struct RunInput {
    pub units: Units,
    pub datafile: Option<String>,
    pub forcetype: ForceKind,
    pub epsilon: f64,
    pub sigma: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub ntimes: usize,
    pub dt: f64,
    pub t_request: f64,
    pub rho: f64,
    pub neigh_every: usize,
    pub force_cut: f64,
    pub neigh_cut: f64,
    pub thermo_nstat: usize,
}

impl Default for RunInput {
    /// The stock Lennard-Jones benchmark scenario
    fn default() -> RunInput {
        RunInput {
            units: Units::Lj,
            datafile: None,
            forcetype: ForceKind::Lj,
            epsilon: 1.0,
            sigma: 1.0,
            nx: 32,
            ny: 32,
            nz: 32,
            ntimes: 100,
            dt: 0.005,
            t_request: 1.44,
            rho: 0.8442,
            neigh_every: 20,
            force_cut: 2.5,
            neigh_cut: 2.8,
            thermo_nstat: 100,
        }
    }
}

impl RunInput {
    /// The skin is the slack the neighbor list keeps beyond the force cutoff
    pub fn skin(&self) -> f64 {
        self.neigh_cut - self.force_cut
    }
}

fn parse_token<T: std::str::FromStr>(token: &str, line: &str) -> Result<T, InputError> {
    token.parse::<T>().map_err(|_| InputError::CantParseEntry {
        line: line.to_string(),
        value: token.to_string(),
    })
}

/// Reads the fixed-order input file
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<RunInput, InputError> {
    let fname = path.as_ref().display().to_string();
    let file = File::open(&path).map_err(|_| InputError::FileNotFound { file_name: fname })?;
    let reader = BufReader::new(file);

    // ---------- the first line is a comment; blank lines separate sections
    let mut lines: Vec<String> = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if i == 0 {
            continue;
        }
        if !line.trim().is_empty() {
            lines.push(line.trim().to_string());
        }
    }
    let mut next = {
        let mut it = lines.into_iter();
        move |what: &str| -> Result<String, InputError> {
            it.next().ok_or(InputError::MissingLine {
                what: what.to_string(),
            })
        }
    };

    let mut input = RunInput::default();

    let line = next("units")?;
    input.units = match line.split_whitespace().next().unwrap_or("") {
        "lj" => Units::Lj,
        "metal" => Units::Metal,
        other => {
            return Err(InputError::UnknownKeyword {
                line: line.clone(),
                value: other.to_string(),
            })
        }
    };

    let line = next("data file")?;
    let word = line.split_whitespace().next().unwrap_or("none");
    input.datafile = if word == "none" {
        None
    } else {
        Some(word.to_string())
    };

    let line = next("force style")?;
    input.forcetype = match line.split_whitespace().next().unwrap_or("") {
        "lj" => ForceKind::Lj,
        "eam" => ForceKind::Eam,
        other => {
            return Err(InputError::UnknownKeyword {
                line: line.clone(),
                value: other.to_string(),
            })
        }
    };

    let line = next("force parameters")?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    input.epsilon = parse_token(tokens.first().copied().unwrap_or(""), &line)?;
    input.sigma = parse_token(tokens.get(1).copied().unwrap_or(""), &line)?;

    let line = next("problem size")?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    input.nx = parse_token(tokens.first().copied().unwrap_or(""), &line)?;
    input.ny = parse_token(tokens.get(1).copied().unwrap_or(""), &line)?;
    input.nz = parse_token(tokens.get(2).copied().unwrap_or(""), &line)?;

    let line = next("timesteps")?;
    input.ntimes = parse_token(line.split_whitespace().next().unwrap_or(""), &line)?;

    let line = next("timestep size")?;
    input.dt = parse_token(line.split_whitespace().next().unwrap_or(""), &line)?;

    let line = next("initial temperature")?;
    input.t_request = parse_token(line.split_whitespace().next().unwrap_or(""), &line)?;

    let line = next("density")?;
    input.rho = parse_token(line.split_whitespace().next().unwrap_or(""), &line)?;

    let line = next("reneighboring cadence")?;
    input.neigh_every = parse_token(line.split_whitespace().next().unwrap_or(""), &line)?;

    let line = next("force cutoff and skin")?;
    let tokens: Vec<&str> = line.split_whitespace().collect();
    input.force_cut = parse_token(tokens.first().copied().unwrap_or(""), &line)?;
    let skin: f64 = parse_token(tokens.get(1).copied().unwrap_or(""), &line)?;
    input.neigh_cut = input.force_cut + skin;

    let line = next("thermo cadence")?;
    input.thermo_nstat = parse_token(line.split_whitespace().next().unwrap_or(""), &line)?;

    Ok(input)
}
