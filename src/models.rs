//! Core data structures shared by the pipeline stages.
//!
//! Defines business domains, source-file routing, lookup outcomes and the
//! per-stage statistics reported at the end of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Coarse business domain of a unified fact row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Domain {
    Internet,
    Movil,
    TelefoniaFija,
    TV,
    Postal,
    Portabilidad,
    Otros,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Internet => "Internet",
            Domain::Movil => "Movil",
            Domain::TelefoniaFija => "TelefoniaFija",
            Domain::TV => "TV",
            Domain::Postal => "Postal",
            Domain::Portabilidad => "Portabilidad",
            Domain::Otros => "Otros",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Internet" => Some(Domain::Internet),
            "Movil" => Some(Domain::Movil),
            "TelefoniaFija" => Some(Domain::TelefoniaFija),
            "TV" => Some(Domain::TV),
            "Postal" => Some(Domain::Postal),
            "Portabilidad" => Some(Domain::Portabilidad),
            "Otros" => Some(Domain::Otros),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which fact builder handles a raw table, detected from its file stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactKind {
    /// Revenue table, tagged with the service named by the stem
    Revenue { service: Option<&'static str> },
    /// Wide table with one column per access technology
    InternetTechnologies,
    /// Wide table with one column per speed bucket
    InternetSpeedRanges,
    /// Mean download speed in Mbps
    InternetMeanSpeed,
    /// Any other internet access table
    InternetAccesses,
    /// Mobile tables carry no province
    Mobile,
    FixedTelephony,
    Television,
}

impl FactKind {
    /// Detect the fact kind from a file stem. Access-table patterns are
    /// checked before revenue, so `telefonia_fija_ingresos` is a fixed
    /// telephony table.
    pub fn from_stem(stem: &str) -> Option<Self> {
        let stem = stem.to_lowercase();

        if stem.contains("internet_accesos") {
            if stem.contains("tecnologias") {
                Some(FactKind::InternetTechnologies)
            } else if stem.contains("velocidad_rangos") {
                Some(FactKind::InternetSpeedRanges)
            } else {
                Some(FactKind::InternetAccesses)
            }
        } else if stem.contains("internet_velocidad_media") {
            Some(FactKind::InternetMeanSpeed)
        } else if stem.contains("comunicaciones_moviles") {
            Some(FactKind::Mobile)
        } else if stem.contains("telefonia_fija") {
            Some(FactKind::FixedTelephony)
        } else if stem.contains("tv_") {
            Some(FactKind::Television)
        } else if stem.contains("ingresos") {
            let service = crate::constants::REVENUE_SERVICE_RULES
                .iter()
                .find(|(fragment, _)| stem.contains(fragment))
                .map(|(_, service)| *service);
            Some(FactKind::Revenue { service })
        } else {
            None
        }
    }

    /// Detect the fact kind from a path, ignoring a trailing `_clean`
    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_stem(&source_stem(path))
    }

    /// Whether rows of this kind are keyed by province
    pub fn has_province(&self) -> bool {
        !matches!(self, FactKind::Mobile)
    }
}

/// File stem with the clean-stage suffix removed
pub fn source_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.strip_suffix(crate::constants::CLEAN_SUFFIX)
        .map(str::to_string)
        .unwrap_or(stem)
}

/// Outcome of mapping a raw attribute value onto a dimension key.
///
/// Callers that only need the key use [`Resolution::key`]; the other
/// variants let tests and logs tell an absent value from a bad one.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// The value maps to a dimension member
    Matched(T),
    /// The value is well formed but no member corresponds to it
    NoMatch,
    /// The raw value is absent (null, NaN, blank)
    Missing,
    /// The raw value cannot be interpreted at all
    Malformed(String),
}

impl<T> Resolution<T> {
    pub fn key(self) -> Option<T> {
        match self {
            Resolution::Matched(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Resolution::Matched(value) => Resolution::Matched(f(value)),
            Resolution::NoMatch => Resolution::NoMatch,
            Resolution::Missing => Resolution::Missing,
            Resolution::Malformed(reason) => Resolution::Malformed(reason),
        }
    }
}

/// How the time dimension was obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeOrigin {
    /// Distinct pairs observed in the given file
    Observed { source: PathBuf },
    /// Default range, with the reason the source could not be used
    Fallback { reason: String },
}

impl TimeOrigin {
    pub fn is_fallback(&self) -> bool {
        matches!(self, TimeOrigin::Fallback { .. })
    }
}

/// A skipped or failed input with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIssue {
    pub path: PathBuf,
    pub reason: String,
}

/// Processing statistics for one stage
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub generated: Vec<PathBuf>,
    pub skipped: Vec<FileIssue>,
    pub failed: Vec<FileIssue>,
    pub warnings: Vec<String>,
    pub total_rows: usize,
    pub processing_time_ms: u128,
}

impl StageReport {
    pub fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            ..Default::default()
        }
    }

    pub fn record_output(&mut self, path: PathBuf, rows: usize) {
        self.generated.push(path);
        self.total_rows += rows;
    }

    pub fn record_skip(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.skipped.push(FileIssue {
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub fn record_failure(&mut self, path: impl Into<PathBuf>, reason: impl Into<String>) {
        self.failed.push(FileIssue {
            path: path.into(),
            reason: reason.into(),
        });
    }
}

/// Statistics for a whole run
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub stages: Vec<StageReport>,
    pub report_path: Option<PathBuf>,
    pub processing_time_ms: u128,
}

impl PipelineStats {
    pub fn files_generated(&self) -> usize {
        self.stages.iter().map(|s| s.generated.len()).sum()
    }

    pub fn files_failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed.len()).sum()
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_kind_routing() {
        assert_eq!(
            FactKind::from_stem("internet_accesos_tecnologias_provincias"),
            Some(FactKind::InternetTechnologies)
        );
        assert_eq!(
            FactKind::from_stem("internet_accesos_velocidad_rangos_provincias"),
            Some(FactKind::InternetSpeedRanges)
        );
        assert_eq!(
            FactKind::from_stem("internet_accesos_baf_provincias"),
            Some(FactKind::InternetAccesses)
        );
        assert_eq!(
            FactKind::from_stem("comunicaciones_moviles_accesos_totales"),
            Some(FactKind::Mobile)
        );
        assert_eq!(FactKind::from_stem("tv_accesos_provincias"), Some(FactKind::Television));
        assert_eq!(FactKind::from_stem("portabilidad_numerica"), None);
    }

    #[test]
    fn test_access_patterns_checked_before_revenue() {
        assert_eq!(
            FactKind::from_stem("internet_ingresos_trimestrales"),
            Some(FactKind::Revenue {
                service: Some("INTERNET_FIJO")
            })
        );
        assert_eq!(
            FactKind::from_stem("ingresos_tv"),
            Some(FactKind::Revenue {
                service: Some("TV_PAGA")
            })
        );
        assert_eq!(
            FactKind::from_stem("telefonia_fija_ingresos"),
            Some(FactKind::FixedTelephony)
        );
        assert_eq!(
            FactKind::from_stem("internet_accesos_ingresos"),
            Some(FactKind::InternetAccesses)
        );
        assert_eq!(
            FactKind::from_stem("ingresos_postales"),
            Some(FactKind::Revenue { service: None })
        );
    }

    #[test]
    fn test_source_stem_strips_clean_suffix() {
        assert_eq!(
            source_stem(Path::new("data/processed/tv_accesos_clean.csv")),
            "tv_accesos"
        );
        assert_eq!(source_stem(Path::new("raw/tv_accesos.xlsx")), "tv_accesos");
    }

    #[test]
    fn test_resolution_key() {
        assert_eq!(Resolution::Matched("PR01").key(), Some("PR01"));
        assert_eq!(Resolution::<&str>::NoMatch.key(), None);
        assert_eq!(Resolution::<&str>::Malformed("x".into()).key(), None);
        assert!(Resolution::Matched(1).map(|v| v + 1).is_matched());
    }
}
