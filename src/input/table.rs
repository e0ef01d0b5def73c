use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use ndarray::Array2;

use crate::input::{FileFormat, InputError, detect_format};

/// A row-labeled numeric table: first column holds row names, header holds column names.
#[derive(Debug, Clone)]
pub struct LabeledTable {
    pub row_names: Vec<String>,
    pub col_names: Vec<String>,
    pub values: Array2<f64>,
}

impl LabeledTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.col_names
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

pub fn open_maybe_gz(path: &Path, gzip: bool) -> Result<Box<dyn BufRead>, InputError> {
    let file = File::open(path)?;
    if gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn read_table(path: &Path) -> Result<LabeledTable, InputError> {
    let (delimiter, gzip) = match detect_format(path)? {
        FileFormat::Table { delimiter, gzip } => (delimiter, gzip),
        FileFormat::Blob => {
            return Err(InputError::UnsupportedFormat(format!(
                "{} is a blob, expected a delimited table",
                path.display()
            )));
        }
    };
    let reader = open_maybe_gz(path, gzip)?;
    parse_table(reader, delimiter, &path.display().to_string())
}

pub fn parse_table<R: BufRead>(
    reader: R,
    delimiter: char,
    source: &str,
) -> Result<LabeledTable, InputError> {
    let mut header: Option<Vec<String>> = None;
    let mut col_names: Option<Vec<String>> = None;
    let mut row_names = Vec::new();
    let mut data = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let fields = line.split(delimiter).map(unquote).collect::<Vec<_>>();

        let Some(head) = &header else {
            header = Some(fields.into_iter().map(str::to_string).collect());
            continue;
        };

        if col_names.is_none() {
            let names = if head.len() == fields.len() {
                head[1..].to_vec()
            } else if head.len() + 1 == fields.len() {
                head.clone()
            } else {
                return Err(InputError::Parse {
                    file: source.to_string(),
                    line: line_no,
                    msg: format!(
                        "header has {} fields but first row has {}",
                        head.len(),
                        fields.len()
                    ),
                });
            };
            col_names = Some(names);
        }
        let n_cols = col_names.as_ref().map_or(0, |c| c.len());
        if fields.len() != n_cols + 1 {
            return Err(InputError::Parse {
                file: source.to_string(),
                line: line_no,
                msg: format!("expected {} fields, found {}", n_cols + 1, fields.len()),
            });
        }

        row_names.push(fields[0].to_string());
        for field in &fields[1..] {
            data.push(parse_value(field).ok_or_else(|| InputError::Parse {
                file: source.to_string(),
                line: line_no,
                msg: format!("not a number: {field:?}"),
            })?);
        }
    }

    let Some(col_names) = col_names else {
        return Err(InputError::InvalidInput(format!(
            "{source}: table has no data rows"
        )));
    };
    let values = Array2::from_shape_vec((row_names.len(), col_names.len()), data)
        .map_err(|e| InputError::InvalidInput(format!("{source}: {e}")))?;

    Ok(LabeledTable {
        row_names,
        col_names,
        values,
    })
}

fn unquote(field: &str) -> &str {
    let field = field.trim();
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

fn parse_value(field: &str) -> Option<f64> {
    match field {
        "" | "NA" | "NaN" | "nan" | "NAN" | "na" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/table.rs"]
mod tests;
