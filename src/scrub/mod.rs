use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use csv::ReaderBuilder;
use encoding_rs::Encoding;
use tracing::{debug, info, warn};

use crate::discover::RecordKind;
use crate::error::PipelineError;
use crate::table::{Table, ID_COLUMN};

/// Ordered character substitution table. Applied to every occurrence in
/// every field; characters outside the table pass through untouched, which
/// is what makes a second application a no-op on already-clean text.
pub const SUBSTITUTIONS: &[(char, &str)] = &[
    ('@', "at"),
    ('#', "hashtag"),
    ('\'', "quote"),
    ('"', "quote"),
    ('&', "and"),
    ('-', "minus"),
    (';', "semicolon"),
    (':', "colon"),
    ('~', " "),
];

/// Vaccination extracts from some years carry trailing junk columns; only
/// the identifier plus the seven canonical fields are honored.
pub const VACCINATION_COLUMN_LIMIT: usize = 8;

#[derive(Debug)]
pub struct ScrubOutcome {
    pub out_path: PathBuf,
    pub rows_written: u64,
    pub rows_dropped: u64,
}

/// Replace every tabled character in `raw` with its word substitute.
pub fn scrub_value(raw: &str) -> String {
    if !raw.chars().any(|c| SUBSTITUTIONS.iter().any(|(s, _)| *s == c)) {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match SUBSTITUTIONS.iter().find(|(s, _)| *s == c) {
            Some((_, replacement)) => out.push_str(replacement),
            None => out.push(c),
        }
    }
    out
}

/// Statistically infer the byte encoding of `bytes` and decode. If decoding
/// with the detected encoding mangles the input, retry with the configured
/// fallback; with no fallback (or a fallback that also mangles), the file is
/// rejected.
fn detect_and_decode(
    path: &Path,
    bytes: &[u8],
    fallback: Option<&'static Encoding>,
) -> Result<String, PipelineError> {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let detected = detector.guess(None, true);
    debug!(path = %path.display(), encoding = detected.name(), "detected encoding");

    let (text, _, had_errors) = detected.decode(bytes);
    if !had_errors {
        return Ok(text.into_owned());
    }
    if let Some(fallback) = fallback {
        warn!(
            path = %path.display(),
            detected = detected.name(),
            fallback = fallback.name(),
            "detected encoding failed to decode cleanly; using fallback"
        );
        let (text, _, had_errors) = fallback.decode(bytes);
        if !had_errors {
            return Ok(text.into_owned());
        }
    }
    Err(PipelineError::Encoding {
        path: path.to_path_buf(),
    })
}

/// Sanitize one raw extract into `out_dir` under the same file name.
///
/// Detects the encoding, drops a pandas-style unnamed index column if the
/// source grew one, truncates vaccination files to their first eight
/// columns, applies the substitution table to every field, and writes the
/// result as UTF-8. Rows that do not match the header's field count are
/// dropped and counted, never fatal.
#[tracing::instrument(level = "info", skip_all, fields(file = %input.display()))]
pub fn scrub(
    input: &Path,
    out_dir: &Path,
    kind: RecordKind,
    fallback: Option<&'static Encoding>,
) -> Result<ScrubOutcome, PipelineError> {
    info!("scrubbing");
    let bytes = fs::read(input).map_err(|e| PipelineError::io(input, e))?;
    let text = detect_and_decode(input, &bytes, fallback)?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(text.into_bytes()));

    let mut headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();

    // A re-exported file may carry an unnamed auto-increment column ahead of
    // the subject identifier; drop it so VAERS_ID is the key again.
    let drop_leading = headers.first().is_some_and(|h| h.trim().is_empty());
    if drop_leading {
        headers.remove(0);
    }
    let declared = headers.len();
    if kind == RecordKind::Vaccination && headers.len() > VACCINATION_COLUMN_LIMIT {
        headers.truncate(VACCINATION_COLUMN_LIMIT);
    }
    if !headers.iter().any(|h| h == ID_COLUMN) {
        return Err(PipelineError::Parse {
            path: input.to_path_buf(),
            reason: format!("header has no {ID_COLUMN} column"),
        });
    }

    // Rows are judged against the declared header width; the vaccination
    // truncation only narrows which declared columns get written out.
    let expected = declared + usize::from(drop_leading);
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut rows_dropped = 0u64;

    for record in rdr.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dropping unparseable row");
                rows_dropped += 1;
                continue;
            }
        };
        if record.len() != expected {
            warn!(
                fields = record.len(),
                expected, "dropping row with wrong field count"
            );
            rows_dropped += 1;
            continue;
        }
        let row: Vec<String> = record
            .iter()
            .skip(usize::from(drop_leading))
            .take(headers.len())
            .map(scrub_value)
            .collect();
        rows.push(row);
    }

    let rows_written = rows.len() as u64;
    let out_path = out_dir.join(input.file_name().ok_or_else(|| PipelineError::Parse {
        path: input.to_path_buf(),
        reason: "input path has no file name".into(),
    })?);
    Table { headers, rows }.write(&out_path)?;

    info!(rows = rows_written, dropped = rows_dropped, out = %out_path.display(), "scrubbed");
    Ok(ScrubOutcome {
        out_path,
        rows_written,
        rows_dropped,
    })
}
