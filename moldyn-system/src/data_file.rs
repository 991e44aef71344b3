use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::simbox::SimBox;

/// Errors that may be thrown while reading a LAMMPS data file
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DataFileError {
    #[error("Can't open data file: {file_name}")]
    FileNotFound { file_name: String },
    #[error("The following header line of a data file is not formatted correctly: {line}")]
    IncorrectHeader { line: String },
    #[error("The following entry: '{value}' can't be parsed to a number; the problematic line was: {line}")]
    CantParseEntry { line: String, value: String },
    #[error("Atom id {id} is out of the declared range of {natoms} atoms")]
    AtomIdOutOfRange { id: usize, natoms: usize },
    #[error("Data file declares {natoms} atoms but its '{section}' section holds {found}")]
    IncompleteSection {
        section: String,
        natoms: usize,
        found: usize,
    },
    #[error("General I/O error occurred while reading a data file")]
    Io(#[from] std::io::Error),
}

/// Contents of a LAMMPS data file: the global box plus per-atom rows
/// ordered by atom id.
#[derive(Clone, Debug)]
pub struct DataFile {
    pub natoms: usize,
    pub simbox: SimBox,
    pub types: Vec<i32>,
    pub positions: Vec<[f64; 3]>,
    pub velocities: Vec<[f64; 3]>,
}

fn parse_field<T: std::str::FromStr>(token: &str, line: &str) -> Result<T, DataFileError> {
    token.parse::<T>().map_err(|_| DataFileError::CantParseEntry {
        line: line.to_string(),
        value: token.to_string(),
    })
}

/// Reads a LAMMPS data file: the standard header followed by `Atoms` and
/// `Velocities` sections.
///
/// Atoms may sit anywhere in the global box; the caller places them all on one
/// rank and lets the first exchange hand each atom to its owner.
pub fn read_lammps_data<P: AsRef<Path>>(path: P) -> Result<DataFile, DataFileError> {
    let fname = path.as_ref().display().to_string();
    let file = File::open(&path).map_err(|_| DataFileError::FileNotFound {
        file_name: fname.clone(),
    })?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    lines.next(); // title line

    let mut natoms = 0usize;
    let mut xlo = 0.0;
    let mut xhi = 0.0;
    let mut ylo = 0.0;
    let mut yhi = 0.0;
    let mut zlo = 0.0;
    let mut zhi = 0.0;
    let mut section: Option<String> = None;

    // ---------- header: free-order keyword lines until the first section name
    while let Some(line) = lines.next() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if trimmed.ends_with("atoms") {
            natoms = parse_field(tokens[0], trimmed)?;
        } else if trimmed.ends_with("atom types") || trimmed.ends_with("bonds") {
            continue;
        } else if trimmed.ends_with("xlo xhi") {
            xlo = parse_field(tokens[0], trimmed)?;
            xhi = parse_field(tokens[1], trimmed)?;
        } else if trimmed.ends_with("ylo yhi") {
            ylo = parse_field(tokens[0], trimmed)?;
            yhi = parse_field(tokens[1], trimmed)?;
        } else if trimmed.ends_with("zlo zhi") {
            zlo = parse_field(tokens[0], trimmed)?;
            zhi = parse_field(tokens[1], trimmed)?;
        } else if tokens.len() == 1 || trimmed == "Atoms" || trimmed == "Velocities" {
            section = Some(tokens[0].to_string());
            break;
        } else {
            return Err(DataFileError::IncorrectHeader {
                line: trimmed.to_string(),
            });
        }
    }

    let simbox = SimBox::new(xhi - xlo, yhi - ylo, zhi - zlo);
    let mut out = DataFile {
        natoms,
        simbox,
        types: vec![0; natoms],
        positions: vec![[0.0; 3]; natoms],
        velocities: vec![[0.0; 3]; natoms],
    };
    let mut seen_atoms = 0usize;
    let mut seen_velocities = 0usize;

    // ---------- sections: 'Atoms' and 'Velocities' rows keyed by atom id
    while let Some(name) = section.take() {
        loop {
            let line = match lines.next() {
                Some(l) => l?,
                None => break,
            };
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            if tokens.len() == 1 && tokens[0].parse::<f64>().is_err() {
                section = Some(tokens[0].to_string());
                break;
            }
            let id: usize = parse_field(tokens[0], &trimmed)?;
            if id < 1 || id > natoms {
                return Err(DataFileError::AtomIdOutOfRange { id, natoms });
            }
            match name.as_str() {
                "Atoms" => {
                    out.types[id - 1] = parse_field(tokens[1], &trimmed)?;
                    for d in 0..3 {
                        out.positions[id - 1][d] = parse_field(tokens[2 + d], &trimmed)?;
                        // shift into the [0, prd) frame the engine works in
                        out.positions[id - 1][d] -= [xlo, ylo, zlo][d];
                    }
                    seen_atoms += 1;
                }
                "Velocities" => {
                    for d in 0..3 {
                        out.velocities[id - 1][d] = parse_field(tokens[1 + d], &trimmed)?;
                    }
                    seen_velocities += 1;
                }
                _ => {}
            }
        }
    }

    if seen_atoms != natoms {
        return Err(DataFileError::IncompleteSection {
            section: "Atoms".to_string(),
            natoms,
            found: seen_atoms,
        });
    }
    if seen_velocities != 0 && seen_velocities != natoms {
        return Err(DataFileError::IncompleteSection {
            section: "Velocities".to_string(),
            natoms,
            found: seen_velocities,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_close;
    use std::io::Write;

    const TWO_ATOMS: &str = "LAMMPS data file

2 atoms
1 atom types

0.0 4.0 xlo xhi
0.0 4.0 ylo yhi
0.0 4.0 zlo zhi

Atoms

1 1 0.5 0.5 0.5
2 1 2.5 2.5 2.5

Velocities

1 1.0 0.0 0.0
2 -1.0 0.0 0.0
";

    #[test]
    fn read_data_file_test() {
        let path = std::env::temp_dir().join("moldyn_data_file_test.data");
        let mut fh = std::fs::File::create(&path).unwrap();
        fh.write_all(TWO_ATOMS.as_bytes()).unwrap();
        drop(fh);

        let data = read_lammps_data(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(data.natoms, 2);
        assert_close!(data.simbox.xprd, 4.0, 1e-12);
        assert_close!(data.positions[1][0], 2.5, 1e-12);
        assert_close!(data.velocities[0][0], 1.0, 1e-12);
        assert_eq!(data.types[0], 1);
    }

    #[test]
    fn missing_file_test() {
        assert!(read_lammps_data("no_such_file.data").is_err());
    }
}
