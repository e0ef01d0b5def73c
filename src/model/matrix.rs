use std::collections::HashSet;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// Genes x cells expression values with unique row and column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpressionMatrix {
    pub genes: Vec<String>,
    pub cells: Vec<String>,
    pub values: Array2<f64>,
}

impl ExpressionMatrix {
    pub fn new(
        genes: Vec<String>,
        cells: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, ModelError> {
        let matrix = Self {
            genes,
            cells,
            values,
        };
        matrix.validate()?;
        Ok(matrix)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.values.nrows() != self.genes.len() {
            return Err(ModelError::shape(
                "expression matrix rows",
                self.genes.len(),
                self.values.nrows(),
            ));
        }
        if self.values.ncols() != self.cells.len() {
            return Err(ModelError::shape(
                "expression matrix columns",
                self.cells.len(),
                self.values.ncols(),
            ));
        }
        ensure_unique("gene", &self.genes)?;
        ensure_unique("cell", &self.cells)?;
        Ok(())
    }

    pub fn n_genes(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cells(&self) -> usize {
        self.values.ncols()
    }

    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }
}

impl PartialEq for ExpressionMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.genes == other.genes && self.cells == other.cells && bits_eq(&self.values, &other.values)
    }
}

/// Raw and normalized matrices of one dataset, checked to share dimensions and cell order.
#[derive(Debug, Clone)]
pub struct MatrixPair {
    pub raw: Arc<ExpressionMatrix>,
    pub normalized: Arc<ExpressionMatrix>,
}

pub fn ensure_unique(kind: &'static str, names: &[String]) -> Result<(), ModelError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(ModelError::DuplicateName {
                kind,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

pub fn bits_eq(a: &Array2<f64>, b: &Array2<f64>) -> bool {
    a.dim() == b.dim()
        && a
            .iter()
            .zip(b.iter())
            .all(|(x, y)| x.to_bits() == y.to_bits())
}
