use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use tracing::{info, warn};

use crate::error::PipelineError;

/// VAERS publishes no data before 1990.
pub const MIN_YEAR: i32 = 1990;

/// File-name prefix of the non-domestic extract triple.
pub const NON_DOMESTIC_PREFIX: &str = "NonDomestic";

/// Which of the three per-period files a path refers to. The suffix is the
/// fixed tail of the file name, appended to the year (or non-domestic)
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Report,
    Symptom,
    Vaccination,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [
        RecordKind::Report,
        RecordKind::Symptom,
        RecordKind::Vaccination,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            RecordKind::Report => "VAERSDATA.csv",
            RecordKind::Symptom => "VAERSSYMPTOMS.csv",
            RecordKind::Vaccination => "VAERSVAX.csv",
        }
    }
}

/// A calendar year or the non-domestic sentinel. Determines file naming and
/// grouping; periods are disjoint subject populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportingPeriod {
    Year(i32),
    NonDomestic,
}

impl ReportingPeriod {
    /// The file-name prefix: "2019" or "NonDomestic".
    pub fn prefix(&self) -> String {
        match self {
            ReportingPeriod::Year(y) => y.to_string(),
            ReportingPeriod::NonDomestic => NON_DOMESTIC_PREFIX.to_string(),
        }
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}

/// The three same-period files required for joining. Only ever constructed
/// complete; partial groups are excluded at discovery time.
#[derive(Debug, Clone)]
pub struct PeriodFileGroup {
    pub period: ReportingPeriod,
    pub report: PathBuf,
    pub symptoms: PathBuf,
    pub vaccinations: PathBuf,
}

impl PeriodFileGroup {
    fn under(dir: &Path, period: ReportingPeriod) -> Self {
        let name = |kind: RecordKind| dir.join(format!("{}{}", period.prefix(), kind.suffix()));
        PeriodFileGroup {
            period,
            report: name(RecordKind::Report),
            symptoms: name(RecordKind::Symptom),
            vaccinations: name(RecordKind::Vaccination),
        }
    }

    pub fn files(&self) -> [(RecordKind, &Path); 3] {
        [
            (RecordKind::Report, self.report.as_path()),
            (RecordKind::Symptom, self.symptoms.as_path()),
            (RecordKind::Vaccination, self.vaccinations.as_path()),
        ]
    }

    /// The same file names rooted in another directory. Used to address the
    /// scrubbed copies, which keep their source names.
    pub fn relocate(&self, dir: &Path) -> PeriodFileGroup {
        PeriodFileGroup::under(dir, self.period)
    }
}

/// Outcome of file discovery: the complete groups in period order, plus the
/// periods that were probed but excluded for missing files.
#[derive(Debug, Default)]
pub struct Discovery {
    pub groups: Vec<PeriodFileGroup>,
    pub excluded: Vec<ReportingPeriod>,
}

/// Enumerate complete `<root>/<prefix><suffix>` triples for every year in
/// `[start_year, end_year]`, plus the non-domestic triple when requested.
/// A period with fewer than three files present is excluded outright and
/// reported; nothing partial propagates downstream.
#[tracing::instrument(level = "info", skip(root), fields(root = %root.display()))]
pub fn discover(
    root: &Path,
    start_year: i32,
    end_year: i32,
    include_non_domestic: bool,
) -> Result<Discovery, PipelineError> {
    let current_year = Utc::now().year();
    if start_year > end_year {
        return Err(PipelineError::Configuration(format!(
            "start year {start_year} is after end year {end_year}"
        )));
    }
    for year in [start_year, end_year] {
        if !(MIN_YEAR..=current_year).contains(&year) {
            return Err(PipelineError::Configuration(format!(
                "year {year} is outside the supported range {MIN_YEAR}..={current_year}"
            )));
        }
    }

    let mut discovery = Discovery::default();
    let mut periods: Vec<ReportingPeriod> =
        (start_year..=end_year).map(ReportingPeriod::Year).collect();
    if include_non_domestic {
        periods.push(ReportingPeriod::NonDomestic);
    }

    for period in periods {
        let group = PeriodFileGroup::under(root, period);
        let present = group.files().iter().filter(|(_, p)| p.is_file()).count();
        if present == RecordKind::ALL.len() {
            discovery.groups.push(group);
        } else {
            warn!(%period, found = present, expected = RecordKind::ALL.len(), "excluding period: incomplete file group");
            discovery.excluded.push(period);
        }
    }

    info!(
        groups = discovery.groups.len(),
        excluded = discovery.excluded.len(),
        "discovery complete"
    );
    Ok(discovery)
}
