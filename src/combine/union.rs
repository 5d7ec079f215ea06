use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::PipelineError;
use crate::table::Table;

/// File name of the pipeline's terminal artifact.
pub const CORPUS_FILE: &str = "TotalVAERSData.csv";

#[derive(Debug)]
pub struct UnionOutcome {
    pub out_path: PathBuf,
    pub rows: u64,
    pub columns: usize,
}

/// Concatenate the given tables row-wise, in order, into one corpus file.
///
/// The column set only ever grows: when a later table introduces a column,
/// every earlier row is backfilled with an empty value. Subjects repeating
/// across tables are distinct populations and are kept as distinct rows;
/// no deduplication happens here.
#[tracing::instrument(level = "info", skip_all, fields(inputs = inputs.len()))]
pub fn union_tables(inputs: &[PathBuf], out_dir: &Path) -> Result<UnionOutcome, PipelineError> {
    let mut columns: Vec<String> = Vec::new();
    let mut column_index: HashMap<String, usize> = HashMap::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for path in inputs {
        info!(file = %path.display(), "appending");
        let table = Table::read(path)?;

        let mapping: Vec<usize> = table
            .headers
            .iter()
            .map(|h| {
                *column_index.entry(h.clone()).or_insert_with(|| {
                    columns.push(h.clone());
                    columns.len() - 1
                })
            })
            .collect();
        // grow earlier rows to the widened column set
        for row in &mut rows {
            row.resize(columns.len(), String::new());
        }

        for in_row in &table.rows {
            let mut row = vec![String::new(); columns.len()];
            for (i, value) in in_row.iter().enumerate() {
                if let Some(&target) = mapping.get(i) {
                    row[target] = value.clone();
                }
            }
            rows.push(row);
        }
    }

    let out_path = out_dir.join(CORPUS_FILE);
    let outcome = UnionOutcome {
        out_path: out_path.clone(),
        rows: rows.len() as u64,
        columns: columns.len(),
    };
    if columns.is_empty() {
        // nothing discovered at all; leave an empty artifact rather than none
        std::fs::write(&out_path, "").map_err(|e| PipelineError::io(&out_path, e))?;
    } else {
        Table {
            headers: columns,
            rows,
        }
        .write(&out_path)?;
    }

    info!(rows = outcome.rows, columns = outcome.columns, out = %out_path.display(), "corpus written");
    Ok(outcome)
}
