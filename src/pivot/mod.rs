use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::discover::RecordKind;
use crate::error::PipelineError;
use crate::table::{Table, ID_COLUMN};

/// Up to six vaccines per subject, seven fields each.
pub const VACCINE_SLOTS: usize = 6;
pub const VACCINE_FIELDS: [&str; 7] = [
    "VAX_TYPE",
    "VAX_MANU",
    "VAX_LOT",
    "VAX_DOSE_SERIES",
    "VAX_ROUTE",
    "VAX_SITE",
    "VAX_NAME",
];

/// Up to seven symptom rows per subject, five symptom/version pairs each,
/// for 35 numbered pairs in the pivoted header.
pub const SYMPTOM_ROWS: usize = 7;
pub const SYMPTOM_PAIRS_PER_ROW: usize = 5;

static VACCINATION_SCHEMA: Lazy<SlotSchema> = Lazy::new(|| {
    let mut headers = vec![ID_COLUMN.to_string()];
    for slot in 1..=VACCINE_SLOTS {
        for field in VACCINE_FIELDS {
            headers.push(format!("{field}_{slot}"));
        }
    }
    SlotSchema {
        max_rows: VACCINE_SLOTS,
        fields_per_row: VACCINE_FIELDS.len(),
        headers,
    }
});

static SYMPTOM_SCHEMA: Lazy<SlotSchema> = Lazy::new(|| {
    let mut headers = vec![ID_COLUMN.to_string()];
    for pair in 1..=(SYMPTOM_ROWS * SYMPTOM_PAIRS_PER_ROW) {
        headers.push(format!("SYMPTOM{pair}"));
        headers.push(format!("SYMPTOMVERSION{pair}"));
    }
    SlotSchema {
        max_rows: SYMPTOM_ROWS,
        fields_per_row: SYMPTOM_PAIRS_PER_ROW * 2,
        headers,
    }
});

/// What to do when one subject has more rows than the schema has slots.
/// The excess rows are degenerate data either way; dropping them (the
/// default, matching historical behavior) is counted and logged so the loss
/// is visible in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    LogAndDrop,
    Fail,
}

/// Fixed-width layout of a pivoted row: row k of a subject (1-indexed)
/// lands at field offset `fields_per_row * (k - 1)` after the identifier.
#[derive(Debug, Clone)]
pub struct SlotSchema {
    max_rows: usize,
    fields_per_row: usize,
    headers: Vec<String>,
}

impl SlotSchema {
    pub fn vaccination() -> &'static SlotSchema {
        &VACCINATION_SCHEMA
    }

    pub fn symptom() -> &'static SlotSchema {
        &SYMPTOM_SCHEMA
    }

    /// The schema for kinds that pivot; report files are already 1:1 per
    /// subject and pass through untouched.
    pub fn for_kind(kind: RecordKind) -> Option<&'static SlotSchema> {
        match kind {
            RecordKind::Report => None,
            RecordKind::Symptom => Some(SlotSchema::symptom()),
            RecordKind::Vaccination => Some(SlotSchema::vaccination()),
        }
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Total column count of a pivoted row, identifier included.
    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug, Default)]
pub struct PivotOutcome {
    pub subjects: u64,
    pub rows_dropped: u64,
    pub rows_overflowed: u64,
}

/// Collapse all rows sharing a subject identifier into one fixed-width row,
/// overwriting `path` in place.
///
/// Output row order is first-occurrence order of each subject; slot filling
/// is strictly positional by arrival order, never semantic. Unfilled slots
/// stay empty. A file whose header is already at (or beyond) the pivoted
/// width is rejected, untouched, so an accidental second application cannot
/// silently corrupt the data.
#[tracing::instrument(level = "info", skip_all, fields(file = %path.display()))]
pub fn pivot_in_place(
    path: &Path,
    schema: &SlotSchema,
    policy: OverflowPolicy,
) -> Result<PivotOutcome, PipelineError> {
    info!("pivoting");
    let table = Table::read(path)?;

    if table.headers.len() >= schema.width() {
        return Err(PipelineError::Reentrancy {
            path: path.to_path_buf(),
            columns: table.headers.len(),
        });
    }
    let id_idx = table
        .column_index(ID_COLUMN)
        .ok_or_else(|| PipelineError::Parse {
            path: path.to_path_buf(),
            reason: format!("header has no {ID_COLUMN} column"),
        })?;

    let mut outcome = PivotOutcome::default();
    let mut out_rows: Vec<Vec<String>> = Vec::new();
    // subject -> (output row index, rows seen so far)
    let mut seen: HashMap<String, (usize, usize)> = HashMap::new();

    for row in &table.rows {
        if row.len() != table.headers.len() {
            warn!(
                fields = row.len(),
                expected = table.headers.len(),
                "dropping row with wrong field count"
            );
            outcome.rows_dropped += 1;
            continue;
        }
        let subject = &row[id_idx];
        let (out_idx, row_no) = match seen.get_mut(subject) {
            Some((out_idx, count)) => {
                let row_no = *count;
                *count += 1;
                (*out_idx, row_no)
            }
            None => {
                let out_idx = out_rows.len();
                let mut fresh = vec![String::new(); schema.width()];
                fresh[0] = subject.clone();
                out_rows.push(fresh);
                seen.insert(subject.clone(), (out_idx, 1));
                (out_idx, 0)
            }
        };

        if row_no >= schema.max_rows {
            match policy {
                OverflowPolicy::Fail => {
                    return Err(PipelineError::CapacityOverflow {
                        subject: subject.clone(),
                        max_rows: schema.max_rows,
                        path: path.to_path_buf(),
                    });
                }
                OverflowPolicy::LogAndDrop => {
                    warn!(subject = %subject, max_rows = schema.max_rows, "slot capacity overflow; dropping row");
                    outcome.rows_overflowed += 1;
                    continue;
                }
            }
        }

        let offset = 1 + row_no * schema.fields_per_row;
        let fields = row
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_idx)
            .map(|(_, v)| v);
        for (i, value) in fields.take(schema.fields_per_row).enumerate() {
            out_rows[out_idx][offset + i] = value.clone();
        }
    }

    outcome.subjects = out_rows.len() as u64;
    Table {
        headers: schema.headers.clone(),
        rows: out_rows,
    }
    .write(path)?;

    info!(
        subjects = outcome.subjects,
        dropped = outcome.rows_dropped,
        overflowed = outcome.rows_overflowed,
        "pivoted"
    );
    Ok(outcome)
}
