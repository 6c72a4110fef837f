//! Dimension builder.
//!
//! Produces the five dimension tables of the star schema. Province,
//! technology, speed tier and service come from static catalogs; time is
//! inferred from the source data. Every run rebuilds all five.

pub mod catalog;
pub mod time;

pub use self::time::{TimeDimension, build_time_dimension};

use crate::config::PipelineConfig;
use crate::constants::technology_categories;
use crate::error::{EtlError, Result};
use crate::processor::writer::TableWriter;
use crate::schema::{f64_values, i64_values, string_values};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Names of the dimension tables, as used in `dim_<name>.csv`
pub const DIMENSION_NAMES: [&str; 5] = [
    "tiempo",
    "provincias",
    "tecnologias",
    "velocidades",
    "servicios",
];

/// Location of `dim_<name>.csv` inside `dir`
pub fn dimension_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("dim_{}.csv", name))
}

/// All five dimension tables of one run
#[derive(Debug, Clone)]
pub struct DimensionSet {
    pub time: TimeDimension,
    pub provinces: DataFrame,
    pub technologies: DataFrame,
    pub speed_tiers: DataFrame,
    pub services: DataFrame,
}

impl DimensionSet {
    /// Build every dimension for `config`
    pub fn build(config: &PipelineConfig) -> Result<Self> {
        let set = Self {
            time: build_time_dimension(config)?,
            provinces: catalog::build_provinces()?,
            technologies: catalog::build_technologies()?,
            speed_tiers: catalog::build_speed_tiers()?,
            services: catalog::build_services()?,
        };
        set.validate(config)?;
        debug!(
            "Built dimensions: {} periods, {} provinces, {} technologies, {} speed tiers, {} services",
            set.time.table.height(),
            set.provinces.height(),
            set.technologies.height(),
            set.speed_tiers.height(),
            set.services.height()
        );
        Ok(set)
    }

    /// `(name, table)` pairs in write order
    pub fn tables(&self) -> [(&'static str, &DataFrame); 5] {
        [
            ("tiempo", &self.time.table),
            ("provincias", &self.provinces),
            ("tecnologias", &self.technologies),
            ("velocidades", &self.speed_tiers),
            ("servicios", &self.services),
        ]
    }

    /// Write every table to `dim_<name>.csv` under `dir`, returning the
    /// written paths with their row counts
    pub fn write_all(&self, dir: &Path, writer: &TableWriter) -> Result<Vec<(PathBuf, usize)>> {
        let mut written = Vec::with_capacity(DIMENSION_NAMES.len());
        for (name, table) in self.tables() {
            let path = dimension_path(dir, name);
            let rows = writer.write_csv(&mut table.clone(), &path)?;
            written.push((path, rows));
        }
        Ok(written)
    }

    /// Check the invariants every consumer relies on
    pub fn validate(&self, config: &PipelineConfig) -> Result<()> {
        ensure_unique_keys("tiempo", &self.time.table, "tiempo_id")?;
        ensure_unique_keys("provincias", &self.provinces, "provincia_id")?;
        ensure_unique_keys("tecnologias", &self.technologies, "tecnologia_id")?;
        ensure_unique_keys("velocidades", &self.speed_tiers, "velocidad_id")?;
        ensure_unique_keys("servicios", &self.services, "servicio_id")?;

        if self.provinces.height() != 24 {
            return Err(invalid(
                "provincias",
                format!("expected 24 rows, found {}", self.provinces.height()),
            ));
        }

        let (first, last) = config.time.valid_years;
        for year in i64_values(&self.time.table, "anio")? {
            match year {
                Some(y) if (first as i64..=last as i64).contains(&y) => {}
                other => {
                    return Err(invalid("tiempo", format!("year {:?} outside {}-{}", other, first, last)));
                }
            }
        }
        for quarter in i64_values(&self.time.table, "trimestre")? {
            if !quarter.is_some_and(|q| (1..=4).contains(&q)) {
                return Err(invalid("tiempo", format!("quarter {:?} outside 1-4", quarter)));
            }
        }

        for category in string_values(&self.technologies, "categoria")?
            .into_iter()
            .flatten()
        {
            if !technology_categories::ALL.contains(&category.as_str()) {
                return Err(invalid(
                    "tecnologias",
                    format!("unknown category {}", category),
                ));
            }
        }

        validate_speed_tiers(&self.speed_tiers)
    }
}

/// Tiers must start at 0, be contiguous, and have `min < max` everywhere
/// except possibly the open-ended last tier.
pub fn validate_speed_tiers(tiers: &DataFrame) -> Result<()> {
    let mins = f64_values(tiers, "velocidad_min_kbps")?;
    let maxes = f64_values(tiers, "velocidad_max_kbps")?;
    if mins.first().copied().flatten() != Some(0.0) {
        return Err(invalid("velocidades", "first tier must start at 0".to_string()));
    }
    let count = mins.len();
    for i in 0..count {
        let (Some(min), Some(max)) = (mins[i], maxes[i]) else {
            if i + 1 == count && mins[i].is_some() {
                continue;
            }
            return Err(invalid("velocidades", format!("tier {} has no bounds", i + 1)));
        };
        if i + 1 < count {
            if min >= max {
                return Err(invalid("velocidades", format!("tier {} has min >= max", i + 1)));
            }
            if mins[i + 1] != Some(max) {
                return Err(invalid(
                    "velocidades",
                    format!("tier {} does not start where tier {} ends", i + 2, i + 1),
                ));
            }
        }
    }
    Ok(())
}

/// Fail unless `column` has no duplicate or null values
pub fn ensure_unique_keys(dimension: &str, df: &DataFrame, column: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for key in string_values(df, column)? {
        let Some(key) = key else {
            return Err(invalid(dimension, format!("null value in {}", column)));
        };
        if !seen.insert(key.clone()) {
            return Err(invalid(dimension, format!("duplicate key {}", key)));
        }
    }
    Ok(())
}

fn invalid(dimension: &str, reason: String) -> EtlError {
    EtlError::InvalidDimension {
        dimension: dimension.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_all_dimensions_with_fallback_time() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_base_dir(temp_dir.path());
        let set = DimensionSet::build(&config).unwrap();

        assert!(set.time.used_fallback());
        assert_eq!(set.provinces.height(), 24);
        let names: Vec<_> = set.tables().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, DIMENSION_NAMES);
    }

    #[test]
    fn test_write_all_feeds_resolver() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_base_dir(temp_dir.path());
        let set = DimensionSet::build(&config).unwrap();

        let written = set
            .write_all(&config.dimensional_dir, &TableWriter::new(&config))
            .unwrap();
        assert_eq!(written.len(), 5);
        assert_eq!(written[1], (dimension_path(&config.dimensional_dir, "provincias"), 24));

        let resolver = crate::resolver::KeyResolver::from_dimension_dir(&config.dimensional_dir)
            .unwrap();
        assert!(resolver.province(Some("Salta")).is_matched());
    }

    #[test]
    fn test_duplicate_keys_are_rejected() {
        let df = df!("k" => ["A", "B", "A"]).unwrap();
        match ensure_unique_keys("x", &df, "k") {
            Err(EtlError::InvalidDimension { reason, .. }) => assert!(reason.contains("duplicate")),
            other => panic!("Expected InvalidDimension, got {:?}", other),
        }
    }

    #[test]
    fn test_gapped_speed_tiers_are_rejected() {
        let tiers = df!(
            "velocidad_min_kbps" => [0i64, 3000, 10000],
            "velocidad_max_kbps" => [2999i64, 9999, 999999]
        )
        .unwrap();
        assert!(validate_speed_tiers(&tiers).is_err());

        let contiguous = df!(
            "velocidad_min_kbps" => [0i64, 3000, 10000],
            "velocidad_max_kbps" => [3000i64, 10000, 999999]
        )
        .unwrap();
        assert!(validate_speed_tiers(&contiguous).is_ok());
    }
}
