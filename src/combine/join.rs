use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::discover::PeriodFileGroup;
use crate::error::PipelineError;
use crate::table::{Table, ID_COLUMN};

/// Tail of the per-period joined file name: `2019VAERS.csv`.
pub const JOINED_SUFFIX: &str = "VAERS.csv";

#[derive(Debug)]
pub struct JoinOutcome {
    pub out_path: PathBuf,
    pub subjects: u64,
}

/// One file's rows keyed by subject, identifier stripped from both header
/// and rows. Duplicate keys should be impossible after pivoting; if one
/// slips through anyway the last occurrence wins, with a warning.
struct KeyedTable {
    headers: Vec<String>,
    order: Vec<String>,
    rows: HashMap<String, Vec<String>>,
}

fn load_keyed(path: &Path, period: &str) -> Result<KeyedTable, PipelineError> {
    let table = Table::read(path)?;
    let id_idx = table
        .column_index(ID_COLUMN)
        .ok_or_else(|| PipelineError::Join {
            period: period.to_string(),
            reason: format!("{} is missing the {ID_COLUMN} column", path.display()),
        })?;

    let headers: Vec<String> = table
        .headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut order = Vec::with_capacity(table.rows.len());
    let mut rows = HashMap::with_capacity(table.rows.len());
    for row in &table.rows {
        if row.len() != table.headers.len() {
            warn!(path = %path.display(), fields = row.len(), "skipping ragged row in join input");
            continue;
        }
        let subject = row[id_idx].clone();
        let fields: Vec<String> = row
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_idx)
            .map(|(_, v)| v.clone())
            .collect();
        if rows.insert(subject.clone(), fields).is_none() {
            order.push(subject);
        } else {
            warn!(path = %path.display(), subject = %subject, "duplicate subject in join input; keeping last");
        }
    }
    Ok(KeyedTable {
        headers,
        order,
        rows,
    })
}

/// Inner-join the three pivoted files of one period on the subject
/// identifier. Only subjects present in all three survive; the output
/// column set is the identifier followed by every input's remaining
/// columns, in file order.
#[tracing::instrument(level = "info", skip_all, fields(period = %group.period))]
pub fn join_period(group: &PeriodFileGroup, out_dir: &Path) -> Result<JoinOutcome, PipelineError> {
    info!("joining period");
    let period = group.period.prefix();
    let report = load_keyed(&group.report, &period)?;
    let symptoms = load_keyed(&group.symptoms, &period)?;
    let vaccinations = load_keyed(&group.vaccinations, &period)?;

    let mut headers = vec![ID_COLUMN.to_string()];
    for t in [&report, &symptoms, &vaccinations] {
        headers.extend(t.headers.iter().cloned());
    }

    let mut rows = Vec::new();
    for subject in &report.order {
        let (Some(r), Some(s), Some(v)) = (
            report.rows.get(subject),
            symptoms.rows.get(subject),
            vaccinations.rows.get(subject),
        ) else {
            continue;
        };
        let mut row = Vec::with_capacity(headers.len());
        row.push(subject.clone());
        row.extend(r.iter().cloned());
        row.extend(s.iter().cloned());
        row.extend(v.iter().cloned());
        rows.push(row);
    }

    let out_path = out_dir.join(format!("{period}{JOINED_SUFFIX}"));
    let subjects = rows.len() as u64;
    Table { headers, rows }.write(&out_path)?;

    info!(subjects, out = %out_path.display(), "joined");
    Ok(JoinOutcome { out_path, subjects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::{PeriodFileGroup, ReportingPeriod};
    use std::fs;

    fn group_2019(dir: &Path) -> PeriodFileGroup {
        PeriodFileGroup {
            period: ReportingPeriod::Year(2019),
            report: dir.join("2019VAERSDATA.csv"),
            symptoms: dir.join("2019VAERSSYMPTOMS.csv"),
            vaccinations: dir.join("2019VAERSVAX.csv"),
        }
    }

    #[test]
    fn inner_join_keeps_only_subjects_in_all_three_files() {
        let tmp = tempfile::tempdir().unwrap();
        let group = group_2019(tmp.path());
        fs::write(&group.report, "VAERS_ID,STATE\nA,WA\nB,OR\n").unwrap();
        fs::write(&group.symptoms, "VAERS_ID,SYMPTOM1\nA,rash\nB,fever\nC,ache\n").unwrap();
        fs::write(&group.vaccinations, "VAERS_ID,VAX_TYPE_1\nA,FLU\nB,MMR\n").unwrap();

        let outcome = join_period(&group, tmp.path()).unwrap();
        assert_eq!(outcome.subjects, 2);

        let table = Table::read(&outcome.out_path).unwrap();
        assert_eq!(table.headers, vec!["VAERS_ID", "STATE", "SYMPTOM1", "VAX_TYPE_1"]);
        assert_eq!(table.rows[0], vec!["A", "WA", "rash", "FLU"]);
        assert_eq!(table.rows[1], vec!["B", "OR", "fever", "MMR"]);
    }

    #[test]
    fn output_name_uses_the_period_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let group = group_2019(tmp.path());
        fs::write(&group.report, "VAERS_ID\nA\n").unwrap();
        fs::write(&group.symptoms, "VAERS_ID\nA\n").unwrap();
        fs::write(&group.vaccinations, "VAERS_ID\nA\n").unwrap();

        let outcome = join_period(&group, tmp.path()).unwrap();
        assert_eq!(
            outcome.out_path.file_name().unwrap().to_str().unwrap(),
            "2019VAERS.csv"
        );
    }

    #[test]
    fn missing_id_column_is_a_join_error() {
        let tmp = tempfile::tempdir().unwrap();
        let group = group_2019(tmp.path());
        fs::write(&group.report, "VAERS_ID,STATE\nA,WA\n").unwrap();
        fs::write(&group.symptoms, "NOT_THE_ID,SYMPTOM1\nA,rash\n").unwrap();
        fs::write(&group.vaccinations, "VAERS_ID,VAX_TYPE_1\nA,FLU\n").unwrap();

        let err = join_period(&group, tmp.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Join { .. }));
    }
}
