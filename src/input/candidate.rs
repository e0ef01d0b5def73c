use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::input::table::{LabeledTable, read_table};
use crate::input::InputError;
use crate::model::candidate::{Candidate, Pseudotime, Segment};
use crate::model::matrix::ExpressionMatrix;

const TABLE_SUFFIXES: &[&str] = &["tsv", "tsv.gz", "txt", "txt.gz", "csv", "csv.gz"];
const FIT_LINE_COLUMNS: [&str; 4] = ["x0", "y0", "x1", "y1"];

pub fn find_member(dir: &Path, stem: &str) -> Option<PathBuf> {
    TABLE_SUFFIXES
        .iter()
        .map(|suffix| dir.join(format!("{stem}.{suffix}")))
        .find(|path| path.is_file())
}

fn require_member(dir: &Path, stem: &str) -> Result<PathBuf, InputError> {
    find_member(dir, stem).ok_or_else(|| {
        InputError::MissingInput(format!(
            "{}: missing {stem}.tsv/.csv (optionally .gz)",
            dir.display()
        ))
    })
}

/// Reads a candidate bundle directory. The directory name becomes the candidate id.
pub fn load_candidate_dir(dir: &Path) -> Result<Candidate, InputError> {
    let id = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            InputError::InvalidInput(format!("{}: cannot derive candidate id", dir.display()))
        })?;

    let embedding_path = require_member(dir, "embedding")?;
    let pseudotime_path = require_member(dir, "pseudotime")?;
    let fit_line_path = require_member(dir, "fitline")?;

    tracing::debug!(
        "candidate {}: embedding={}, pseudotime={}, fitline={}",
        id,
        embedding_path.display(),
        pseudotime_path.display(),
        fit_line_path.display()
    );

    let embedding_table = read_table(&embedding_path)?;
    if embedding_table.col_names.len() < 2 {
        return Err(InputError::InvalidInput(format!(
            "{}: embedding needs two coordinate columns, found {}",
            embedding_path.display(),
            embedding_table.col_names.len()
        )));
    }
    let cells = embedding_table.row_names.clone();
    let embedding = embedding_table
        .values
        .slice(ndarray::s![.., 0..2])
        .to_owned();

    let pseudotime = align_pseudotime(&read_table(&pseudotime_path)?, &cells, &id);
    let fit_line = parse_fit_line(&read_table(&fit_line_path)?, &fit_line_path)?;

    let normalized = match find_member(dir, "normalized") {
        Some(path) => {
            let table = read_table(&path)?;
            Some(
                ExpressionMatrix::new(table.row_names, table.col_names, table.values)
                    .map_err(|source| InputError::model(&path, source))?,
            )
        }
        None => None,
    };

    Candidate::new(id, cells, embedding, pseudotime, fit_line, normalized)
        .map_err(|source| InputError::model(dir, source))
}

/// Reorders pseudotime rows to the embedding's cell order; cells absent from the table get NaN.
fn align_pseudotime(table: &LabeledTable, cells: &[String], id: &str) -> Pseudotime {
    let index = table
        .row_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect::<HashMap<_, _>>();
    let n_branches = table.col_names.len();
    let mut values = Array2::from_elem((cells.len(), n_branches), f64::NAN);
    let mut matched = 0usize;
    for (row, cell) in cells.iter().enumerate() {
        if let Some(&src) = index.get(cell.as_str()) {
            values.row_mut(row).assign(&table.values.row(src));
            matched += 1;
        }
    }
    if matched < table.row_names.len() {
        tracing::warn!(
            "candidate {}: {} pseudotime rows name cells absent from the embedding",
            id,
            table.row_names.len() - matched
        );
    }
    Pseudotime {
        branches: table.col_names.clone(),
        values,
    }
}

fn parse_fit_line(table: &LabeledTable, path: &Path) -> Result<Vec<Segment>, InputError> {
    let named = FIT_LINE_COLUMNS
        .iter()
        .map(|c| table.column_index(c))
        .collect::<Option<Vec<_>>>();
    let columns = match named {
        Some(columns) => columns,
        None if table.col_names.len() >= 4 => vec![0, 1, 2, 3],
        None => {
            return Err(InputError::InvalidInput(format!(
                "{}: fit line needs x0 y0 x1 y1 columns, found {}",
                path.display(),
                table.col_names.len()
            )));
        }
    };
    Ok(table
        .values
        .rows()
        .into_iter()
        .map(|row| Segment {
            x0: row[columns[0]],
            y0: row[columns[1]],
            x1: row[columns[2]],
            y1: row[columns[3]],
        })
        .collect())
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/candidate.rs"]
mod tests;
