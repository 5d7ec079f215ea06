use std::fs;
use std::path::PathBuf;

use crate::error::PipelineError;
use crate::pivot::OverflowPolicy;

/// Everything one pipeline run needs, passed explicitly into
/// [`crate::pipeline::run`]. No process-wide state, so multiple
/// configurations can run side by side (tests rely on this).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding the raw yearly extracts.
    pub data_dir: PathBuf,
    /// Directory the scrubbed (and later pivoted) copies are written to.
    pub clean_dir: PathBuf,
    /// Directory for per-period joins and the final corpus.
    pub out_dir: PathBuf,
    pub start_year: i32,
    pub end_year: i32,
    pub include_non_domestic: bool,
    /// Worker pool size; defaults to the core count when `None`.
    pub workers: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    /// Encoding label (e.g. "windows-1252") to fall back to when the
    /// detected encoding fails to decode a file cleanly. `None` means the
    /// file is rejected instead.
    pub fallback_encoding: Option<String>,
}

impl PipelineConfig {
    /// Fail fast on anything that would doom the run: a missing input root,
    /// an unwritable output directory, an unknown fallback encoding label.
    /// Output directories are created if absent; the input root never is.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.data_dir.is_dir() {
            return Err(PipelineError::Configuration(format!(
                "data directory {} does not exist or is not a directory",
                self.data_dir.display()
            )));
        }
        for dir in [&self.clean_dir, &self.out_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                PipelineError::Configuration(format!(
                    "could not create output directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        if let Some(label) = &self.fallback_encoding {
            if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                return Err(PipelineError::Configuration(format!(
                    "unknown fallback encoding label `{label}`"
                )));
            }
        }
        Ok(())
    }

    /// Resolved fallback encoding, if one was configured. Call after
    /// [`validate`](Self::validate); an invalid label yields `None` here.
    pub fn fallback(&self) -> Option<&'static encoding_rs::Encoding> {
        self.fallback_encoding
            .as_ref()
            .and_then(|l| encoding_rs::Encoding::for_label(l.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(data_dir: PathBuf, scratch: &std::path::Path) -> PipelineConfig {
        PipelineConfig {
            data_dir,
            clean_dir: scratch.join("clean"),
            out_dir: scratch.join("out"),
            start_year: 2019,
            end_year: 2020,
            include_non_domestic: false,
            workers: None,
            overflow_policy: OverflowPolicy::LogAndDrop,
            fallback_encoding: None,
        }
    }

    #[test]
    fn missing_data_dir_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = base_config(tmp.path().join("nope"), tmp.path());
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn output_dirs_are_created() {
        let tmp = tempfile::tempdir().unwrap();
        let config = base_config(tmp.path().to_path_buf(), tmp.path());
        config.validate().unwrap();
        assert!(config.clean_dir.is_dir());
        assert!(config.out_dir.is_dir());
    }

    #[test]
    fn bogus_fallback_label_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path().to_path_buf(), tmp.path());
        config.fallback_encoding = Some("not-an-encoding".into());
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn known_fallback_label_resolves() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = base_config(tmp.path().to_path_buf(), tmp.path());
        config.fallback_encoding = Some("windows-1252".into());
        config.validate().unwrap();
        assert_eq!(config.fallback(), Some(encoding_rs::WINDOWS_1252));
    }
}
