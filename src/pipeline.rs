use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{error, info};

use crate::combine::{join_period, union_tables};
use crate::config::PipelineConfig;
use crate::discover::{discover, PeriodFileGroup, ReportingPeriod};
use crate::error::PipelineError;
use crate::pivot::{pivot_in_place, SlotSchema};
use crate::scrub::scrub;

/// Per-run counters, logged once at the end of every run that gets past
/// configuration. `success()` drives the process exit status: a run that
/// completed but excluded periods or failed files is still a failed run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub periods_discovered: usize,
    pub periods_excluded: usize,
    pub periods_joined: usize,
    pub periods_failed: usize,
    pub files_scrubbed: usize,
    pub rows_dropped: u64,
    pub rows_overflowed: u64,
    pub corpus_rows: u64,
    pub corpus_failed: bool,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.periods_excluded == 0 && self.periods_failed == 0 && !self.corpus_failed
    }
}

#[derive(Debug)]
struct PeriodOutcome {
    joined: PathBuf,
    files_scrubbed: usize,
    rows_dropped: u64,
    rows_overflowed: u64,
}

/// Scrub, pivot and join one period's file triple. Everything here touches
/// only this period's files, so periods can run fully in parallel.
fn process_period(
    group: &PeriodFileGroup,
    config: &PipelineConfig,
) -> Result<PeriodOutcome, PipelineError> {
    // the three kind-files are independent until the join
    let scrubbed: Vec<_> = group
        .files()
        .into_par_iter()
        .map(|(kind, path)| scrub(path, &config.clean_dir, kind, config.fallback()))
        .collect::<Result<_, _>>()?;
    let rows_dropped: u64 = scrubbed.iter().map(|s| s.rows_dropped).sum();
    let files_scrubbed = scrubbed.len();

    let clean = group.relocate(&config.clean_dir);
    let mut rows_overflowed = 0u64;
    let mut pivot_dropped = 0u64;
    for (kind, path) in clean.files() {
        if let Some(schema) = SlotSchema::for_kind(kind) {
            let outcome = pivot_in_place(path, schema, config.overflow_policy)?;
            rows_overflowed += outcome.rows_overflowed;
            pivot_dropped += outcome.rows_dropped;
        }
    }

    let join = join_period(&clean, &config.out_dir)?;
    Ok(PeriodOutcome {
        joined: join.out_path,
        files_scrubbed,
        rows_dropped: rows_dropped + pivot_dropped,
        rows_overflowed,
    })
}

/// Run the whole consolidation pipeline for one configuration.
///
/// Configuration and discovery problems abort before any worker starts and
/// surface as `Err`. Past that point failures are isolated per period: every
/// period runs to completion or failure, the survivors are unioned into the
/// corpus, and the summary reports what was lost.
pub fn run(config: &PipelineConfig) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let discovery = discover(
        &config.data_dir,
        config.start_year,
        config.end_year,
        config.include_non_domestic,
    )?;
    if discovery.groups.is_empty() {
        return Err(PipelineError::Configuration(format!(
            "no complete period file groups found under {}",
            config.data_dir.display()
        )));
    }

    let workers = config.workers.unwrap_or_else(num_cpus::get);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| PipelineError::Configuration(format!("could not build worker pool: {e}")))?;
    info!(
        workers,
        periods = discovery.groups.len(),
        "starting pipeline"
    );

    let results: Vec<(ReportingPeriod, Result<PeriodOutcome, PipelineError>)> = pool.install(|| {
        discovery
            .groups
            .par_iter()
            .map(|group| (group.period, process_period(group, config)))
            .collect()
    });

    let mut summary = RunSummary {
        periods_discovered: discovery.groups.len() + discovery.excluded.len(),
        periods_excluded: discovery.excluded.len(),
        ..RunSummary::default()
    };
    let mut joined: Vec<PathBuf> = Vec::new();
    for (period, result) in results {
        match result {
            Ok(outcome) => {
                summary.periods_joined += 1;
                summary.files_scrubbed += outcome.files_scrubbed;
                summary.rows_dropped += outcome.rows_dropped;
                summary.rows_overflowed += outcome.rows_overflowed;
                joined.push(outcome.joined);
            }
            Err(e) => {
                error!(%period, error = %e, "period failed");
                summary.periods_failed += 1;
            }
        }
    }

    // full barrier: every period is done before the corpus is assembled
    match union_tables(&joined, &config.out_dir) {
        Ok(outcome) => summary.corpus_rows = outcome.rows,
        Err(e) => {
            error!(error = %e, "corpus union failed");
            summary.corpus_failed = true;
        }
    }

    info!(
        periods = summary.periods_joined,
        excluded = summary.periods_excluded,
        failed = summary.periods_failed,
        files = summary.files_scrubbed,
        rows_dropped = summary.rows_dropped,
        rows_overflowed = summary.rows_overflowed,
        corpus_rows = summary.corpus_rows,
        "run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::CORPUS_FILE;
    use crate::pivot::OverflowPolicy;
    use crate::table::Table;
    use std::fs;
    use std::path::Path;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn write_year(dir: &Path, year: i32, subjects: &[&str]) {
        let mut data = String::from("VAERS_ID,STATE,NOTES\n");
        let mut symptoms = String::from(
            "VAERS_ID,SYMPTOM1,SYMPTOMVERSION1,SYMPTOM2,SYMPTOMVERSION2,SYMPTOM3,SYMPTOMVERSION3,SYMPTOM4,SYMPTOMVERSION4,SYMPTOM5,SYMPTOMVERSION5\n",
        );
        let mut vax = String::from(
            "VAERS_ID,VAX_TYPE,VAX_MANU,VAX_LOT,VAX_DOSE_SERIES,VAX_ROUTE,VAX_SITE,VAX_NAME\n",
        );
        for s in subjects {
            data.push_str(&format!("{s},WA,pain @ site\n"));
            symptoms.push_str(&format!("{s},rash,25.1,,,,,,,,\n"));
            // two vaccine rows per subject, exercising the pivot
            vax.push_str(&format!("{s},FLU,ACME,L1,1,IM,LA,FLUVAX\n"));
            vax.push_str(&format!("{s},MMR,ACME,L2,1,IM,RA,MMRVAX\n"));
        }
        fs::write(dir.join(format!("{year}VAERSDATA.csv")), data).unwrap();
        fs::write(dir.join(format!("{year}VAERSSYMPTOMS.csv")), symptoms).unwrap();
        fs::write(dir.join(format!("{year}VAERSVAX.csv")), vax).unwrap();
    }

    fn config_for(root: &Path, start: i32, end: i32) -> PipelineConfig {
        PipelineConfig {
            data_dir: root.join("data"),
            clean_dir: root.join("clean"),
            out_dir: root.join("out"),
            start_year: start,
            end_year: end,
            include_non_domestic: false,
            workers: Some(2),
            overflow_policy: OverflowPolicy::LogAndDrop,
            fallback_encoding: None,
        }
    }

    #[test]
    fn end_to_end_two_years() {
        init_test_logging();
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        write_year(&tmp.path().join("data"), 2019, &["1", "2"]);
        write_year(&tmp.path().join("data"), 2020, &["3"]);

        let config = config_for(tmp.path(), 2019, 2020);
        let summary = run(&config).unwrap();
        assert!(summary.success());
        assert_eq!(summary.periods_joined, 2);
        assert_eq!(summary.files_scrubbed, 6);
        assert_eq!(summary.corpus_rows, 3);

        let corpus = Table::read(&config.out_dir.join(CORPUS_FILE)).unwrap();
        assert_eq!(corpus.rows.len(), 3);
        // the '@' in the notes field was substituted during scrubbing
        let notes_idx = corpus.column_index("NOTES").unwrap();
        assert_eq!(corpus.rows[0][notes_idx], "pain at site");
        // second vaccine row pivoted into slot 2
        let vax2_idx = corpus.column_index("VAX_TYPE_2").unwrap();
        assert_eq!(corpus.rows[0][vax2_idx], "MMR");
    }

    #[test]
    fn incomplete_period_fails_the_run_but_not_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(&data).unwrap();
        write_year(&data, 2019, &["1"]);
        // 2020 is missing its vaccination file
        write_year(&data, 2020, &["2"]);
        fs::remove_file(data.join("2020VAERSVAX.csv")).unwrap();

        let summary = run(&config_for(tmp.path(), 2019, 2020)).unwrap();
        assert!(!summary.success());
        assert_eq!(summary.periods_excluded, 1);
        assert_eq!(summary.periods_joined, 1);
        assert_eq!(summary.corpus_rows, 1);
    }

    #[test]
    fn empty_data_dir_is_a_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("data")).unwrap();
        let err = run(&config_for(tmp.path(), 2019, 2019)).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
