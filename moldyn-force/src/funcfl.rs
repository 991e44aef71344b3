use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

/// Errors that may be thrown while loading an interatomic potential file
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PotentialError {
    #[error("Can't open EAM potential file: {file_name}")]
    FileNotFound { file_name: String },
    #[error("Potential file ended before all {expected} values of the {table} table were read")]
    TruncatedTable { table: String, expected: usize },
    #[error("The following entry: '{value}' of a potential file can't be parsed to a number")]
    CantParseEntry { value: String },
    #[error("Malformed potential file header line: {line}")]
    MalformedHeader { line: String },
    #[error("General I/O error occurred while reading a potential file")]
    Io(#[from] std::io::Error),
}

/// Raw contents of a DYNAMO `funcfl` single-element potential file.
///
/// The three tables keep the file's 1-based indexing: `frho[1..=nrho]`,
/// `zr[1..=nr]` and `rhor[1..=nr]`, with index 0 as padding, matching the
/// spline grids built from them.
#[derive(Clone, Debug)]
pub struct Funcfl {
    pub mass: f64,
    pub nrho: usize,
    pub drho: f64,
    pub nr: usize,
    pub dr: f64,
    pub cut: f64,
    pub frho: Vec<f64>,
    pub zr: Vec<f64>,
    pub rhor: Vec<f64>,
}

/// Reads a `funcfl` potential from a file
pub fn read_funcfl<P: AsRef<Path>>(path: P) -> Result<Funcfl, PotentialError> {
    let fname = path.as_ref().display().to_string();
    let file = File::open(&path).map_err(|_| PotentialError::FileNotFound { file_name: fname })?;
    parse_funcfl(BufReader::new(file))
}

/// Parses a `funcfl` potential from any buffered reader.
///
/// Line 1 is a comment; line 2 holds the element number and mass; line 3 the
/// grid sizes, spacings and cutoff. The `F(rho)`, `z(r)` and `rho(r)` tables
/// follow in that order as free-format whitespace-separated values.
pub fn parse_funcfl<R: BufRead>(reader: R) -> Result<Funcfl, PotentialError> {
    let mut lines = reader.lines();
    lines.next(); // comment line

    let header = |line: Option<Result<String, std::io::Error>>| -> Result<Vec<String>, PotentialError> {
        match line {
            Some(l) => Ok(l?.split_whitespace().map(|s| s.to_string()).collect()),
            None => Err(PotentialError::MalformedHeader {
                line: String::new(),
            }),
        }
    };
    let number = |s: &str| -> Result<f64, PotentialError> {
        s.parse::<f64>().map_err(|_| PotentialError::CantParseEntry {
            value: s.to_string(),
        })
    };

    let mass_line = header(lines.next())?;
    if mass_line.len() < 2 {
        return Err(PotentialError::MalformedHeader {
            line: mass_line.join(" "),
        });
    }
    let mass = number(&mass_line[1])?;

    let grid_line = header(lines.next())?;
    if grid_line.len() < 5 {
        return Err(PotentialError::MalformedHeader {
            line: grid_line.join(" "),
        });
    }
    let nrho = number(&grid_line[0])? as usize;
    let drho = number(&grid_line[1])?;
    let nr = number(&grid_line[2])? as usize;
    let dr = number(&grid_line[3])?;
    let cut = number(&grid_line[4])?;

    // ---------- the three tables ride a single free-format token stream
    let mut tokens: Vec<f64> = Vec::with_capacity(nrho + 2 * nr);
    for line in lines {
        for tok in line?.split_whitespace() {
            tokens.push(number(tok)?);
        }
        if tokens.len() >= nrho + 2 * nr {
            break;
        }
    }

    let grab = |name: &str, n: usize, offset: usize| -> Result<Vec<f64>, PotentialError> {
        if tokens.len() < offset + n {
            return Err(PotentialError::TruncatedTable {
                table: name.to_string(),
                expected: n,
            });
        }
        // shift by one: the tables are 1-indexed downstream
        let mut out = vec![0.0; n + 1];
        out[1..=n].copy_from_slice(&tokens[offset..offset + n]);
        Ok(out)
    };

    let frho = grab("F(rho)", nrho, 0)?;
    let zr = grab("z(r)", nr, nrho)?;
    let rhor = grab("rho(r)", nr, nrho + nr)?;

    Ok(Funcfl {
        mass,
        nrho,
        drho,
        nr,
        dr,
        cut,
        frho,
        zr,
        rhor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use moldyn_system::assert_close;
    use std::io::Cursor;

    const TINY_FUNCFL: &str = "sample single-element funcfl table
29 63.550
4 0.5 4 0.25 0.75
0.0 -1.0
-1.5 -1.75
2.0 1.5 1.0 0.5
0.8 0.6
0.4 0.2
";

    #[test]
    fn parse_funcfl_test() {
        let pot = parse_funcfl(Cursor::new(TINY_FUNCFL)).unwrap();
        assert_close!(pot.mass, 63.55, 1e-12);
        assert_eq!(pot.nrho, 4);
        assert_eq!(pot.nr, 4);
        assert_close!(pot.drho, 0.5, 1e-12);
        assert_close!(pot.dr, 0.25, 1e-12);
        assert_close!(pot.cut, 0.75, 1e-12);
        // 1-indexed tables with padding at slot 0
        assert_close!(pot.frho[1], 0.0, 1e-12);
        assert_close!(pot.frho[4], -1.75, 1e-12);
        assert_close!(pot.zr[1], 2.0, 1e-12);
        assert_close!(pot.rhor[4], 0.2, 1e-12);
    }

    #[test]
    fn truncated_table_test() {
        let broken = "comment\n29 63.55\n10 0.5 10 0.25 3.0\n1.0 2.0 3.0\n";
        assert!(parse_funcfl(Cursor::new(broken)).is_err());
    }

    #[test]
    fn missing_file_test() {
        assert!(read_funcfl("no_such_potential.eam").is_err());
    }
}
