//! CSV export of dated tables and labelled matrices.

use anyhow::{anyhow, bail, Context, Result};
use cbspeech_core::analysis::{CorrelationMatrix, PcaResult};
use cbspeech_core::data::{format_float, parse_float, read_table_csv, write_table_csv};
use cbspeech_core::domain::TimeSeriesTable;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub fn write_table(path: &Path, table: &TimeSeriesTable) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create table CSV {}", path.display()))?;
    write_table_csv(table, BufWriter::new(file))
        .with_context(|| format!("Failed to write table CSV {}", path.display()))?;
    Ok(())
}

pub fn read_table(path: &Path) -> Result<TimeSeriesTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open table CSV {}", path.display()))?;
    Ok(read_table_csv(file, path)?)
}

/// A matrix with named rows and columns, written as
/// `<row_header>,<col>,<col>,...` with one line per row.
#[derive(Debug, Clone)]
pub struct LabelledMatrix {
    pub row_header: String,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// `values[i][j]`: row `i`, column `j`.
    pub values: Vec<Vec<f64>>,
}

impl LabelledMatrix {
    /// Variables × components. Entry `(j, k)` is the weight of variable `j`
    /// in component `k`.
    pub fn loadings(pca: &PcaResult) -> Self {
        let columns: Vec<String> = (0..pca.n_components()).map(PcaResult::component_name).collect();
        let values = (0..pca.variables.len())
            .map(|j| pca.loadings.iter().map(|w| w[j]).collect())
            .collect();
        Self {
            row_header: "variable".into(),
            rows: pca.variables.clone(),
            columns,
            values,
        }
    }

    pub fn correlations(matrix: &CorrelationMatrix) -> Self {
        Self {
            row_header: "variable".into(),
            rows: matrix.names.clone(),
            columns: matrix.names.clone(),
            values: matrix.values.clone(),
        }
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let i = self.rows.iter().position(|r| r == row)?;
        let j = self.columns.iter().position(|c| c == column)?;
        Some(self.values[i][j])
    }
}

pub fn write_matrix(path: &Path, matrix: &LabelledMatrix) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create matrix CSV {}", path.display()))?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    let mut header = vec![matrix.row_header.clone()];
    header.extend(matrix.columns.iter().cloned());
    wtr.write_record(&header)?;
    for (name, row) in matrix.rows.iter().zip(&matrix.values) {
        let mut record = Vec::with_capacity(row.len() + 1);
        record.push(name.clone());
        record.extend(row.iter().map(|&v| format_float(v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()
        .with_context(|| format!("Failed to write matrix CSV {}", path.display()))?;
    Ok(())
}

pub fn read_matrix(path: &Path) -> Result<LabelledMatrix> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open matrix CSV {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let headers = rdr.headers()?.clone();
    let Some(row_header) = headers.get(0) else {
        bail!("{}: empty header", path.display());
    };
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    let mut values = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("{}: row {}", path.display(), line + 1))?;
        let mut cells = record.iter();
        rows.push(cells.next().unwrap_or_default().to_string());
        let row = cells
            .map(|cell| parse_float(cell).map_err(|e| anyhow!("{}: row {}: {e}", path.display(), line + 1)))
            .collect::<Result<Vec<f64>>>()?;
        values.push(row);
    }
    Ok(LabelledMatrix {
        row_header: row_header.to_string(),
        rows,
        columns,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn matrix_round_trip_keeps_missing_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("correlation_matrix.csv");
        let matrix = LabelledMatrix::correlations(&CorrelationMatrix {
            names: vec!["a".into(), "b".into()],
            values: vec![vec![1.0, -0.1 - 0.2], vec![-0.1 - 0.2, f64::NAN]],
        });
        write_matrix(&path, &matrix).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("variable,a,b\n"));

        let back = read_matrix(&path).unwrap();
        assert_eq!(back.rows, vec!["a", "b"]);
        assert_eq!(back.columns, vec!["a", "b"]);
        assert_eq!(back.get("a", "b"), Some(-0.1 - 0.2));
        assert!(back.get("b", "b").unwrap().is_nan());
        assert_eq!(back.get("a", "c"), None);
    }

    #[test]
    fn loadings_are_transposed_to_variables_by_components() {
        let pca = PcaResult {
            variables: vec!["GDP".into(), "CPI".into(), "Unemployment".into()],
            means: vec![0.0; 3],
            eigenvalues: vec![2.0, 1.0],
            explained_variance_ratio: vec![0.6, 0.3],
            loadings: vec![vec![0.8, 0.6, 0.0], vec![0.0, 0.0, 1.0]],
            scores: TimeSeriesTable::default(),
            excluded_rows: 0,
        };
        let m = LabelledMatrix::loadings(&pca);
        assert_eq!(m.columns, vec!["PC1", "PC2"]);
        assert_eq!(m.values.len(), 3);
        assert_eq!(m.get("CPI", "PC1"), Some(0.6));
        assert_eq!(m.get("Unemployment", "PC2"), Some(1.0));
    }
}
