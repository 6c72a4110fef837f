//! Key resolution from raw attribute values to dimension surrogate keys.
//!
//! A [`KeyResolver`] is built from dimension tables, either the ones just
//! built in memory or the `dim_*.csv` files of an earlier run. It holds no
//! other state, so fact stages and the dimension stage agree on keys
//! without sharing anything but those tables.

use crate::constants::{
    MBPS_THRESHOLD, PROVINCE_ALIASES, SPEED_BUCKET_SYNONYMS, TECHNOLOGY_SYNONYMS,
};
use crate::dimensions::{DimensionSet, dimension_path};
use crate::error::Result;
use crate::models::Resolution;
use crate::normalize::{compact_key, normalize_str, technology_key};
use crate::schema::{f64_values, i64_values, read_csv_table, string_values};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// One row of the speed tier dimension
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTier {
    pub id: String,
    pub name: String,
    pub min_kbps: f64,
    pub max_kbps: Option<f64>,
}

impl SpeedTier {
    fn contains(&self, kbps: f64) -> bool {
        kbps >= self.min_kbps && self.max_kbps.is_none_or(|max| kbps < max)
    }
}

/// Convert a raw speed to kbps.
///
/// Raw speeds carry no unit tag. Values strictly below 50 are taken to be
/// Mbps and multiplied by 1000; everything else is taken to be kbps
/// already. This misclassifies genuine kbps values under 50 and Mbps
/// values of 50 or more. Historical metrics depend on the exact threshold,
/// so it must not change without new evidence from the data.
pub fn to_kbps(raw: f64) -> f64 {
    if raw < MBPS_THRESHOLD { raw * 1000.0 } else { raw }
}

/// Lookup tables for every foreign key type
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    provinces: HashMap<String, String>,
    periods: HashMap<(i64, i64), String>,
    technologies: HashMap<String, String>,
    speed_tiers: Vec<SpeedTier>,
    services: HashMap<String, String>,
}

impl KeyResolver {
    /// Build from the tables of a [`DimensionSet`]
    pub fn from_dimensions(dimensions: &DimensionSet) -> Result<Self> {
        Self::from_tables(
            &dimensions.time.table,
            &dimensions.provinces,
            &dimensions.technologies,
            &dimensions.speed_tiers,
            &dimensions.services,
        )
    }

    /// Build from `dim_*.csv` files in `dir`
    pub fn from_dimension_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| read_csv_table(&dimension_path(dir, name), true);
        let resolver = Self::from_tables(
            &read("tiempo")?,
            &read("provincias")?,
            &read("tecnologias")?,
            &read("velocidades")?,
            &read("servicios")?,
        )?;
        debug!("Loaded key resolver from {}", dir.display());
        Ok(resolver)
    }

    pub fn from_tables(
        time: &DataFrame,
        provinces: &DataFrame,
        technologies: &DataFrame,
        speed_tiers: &DataFrame,
        services: &DataFrame,
    ) -> Result<Self> {
        let province_map = pairs(
            string_values(provinces, "provincia")?,
            string_values(provinces, "provincia_id")?,
        )
        .map(|(name, id)| (normalize_str(&name), id))
        .collect();

        let period_map = i64_values(time, "anio")?
            .into_iter()
            .zip(i64_values(time, "trimestre")?)
            .zip(string_values(time, "tiempo_id")?)
            .filter_map(|((y, q), id)| Some(((y?, q?), id?)))
            .collect();

        let technology_map = pairs(
            string_values(technologies, "tecnologia")?,
            string_values(technologies, "tecnologia_id")?,
        )
        .map(|(name, id)| (technology_key(&name), id))
        .collect();

        let service_map = pairs(
            string_values(services, "servicio")?,
            string_values(services, "servicio_id")?,
        )
        .map(|(name, id)| (normalize_str(&name), id))
        .collect();

        Ok(Self {
            provinces: province_map,
            periods: period_map,
            technologies: technology_map,
            speed_tiers: speed_tiers_from(speed_tiers)?,
            services: service_map,
        })
    }

    /// Province text to `provincia_id` by normalized equality, after the
    /// alias table.
    pub fn province(&self, raw: Option<&str>) -> Resolution<String> {
        let Some(raw) = raw else {
            return Resolution::Missing;
        };
        let key = normalize_str(raw);
        if key.is_empty() {
            return Resolution::Missing;
        }
        let key = PROVINCE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map_or(key.as_str(), |(_, canonical)| *canonical);
        match self.provinces.get(key) {
            Some(id) => Resolution::Matched(id.clone()),
            None => Resolution::NoMatch,
        }
    }

    /// Exact `(anio, trimestre)` lookup
    pub fn period(&self, year: Option<i64>, quarter: Option<i64>) -> Resolution<String> {
        let (Some(year), Some(quarter)) = (year, quarter) else {
            return Resolution::Missing;
        };
        if !(1..=4).contains(&quarter) {
            return Resolution::Malformed(format!("quarter {} outside 1-4", quarter));
        }
        match self.periods.get(&(year, quarter)) {
            Some(id) => Resolution::Matched(id.clone()),
            None => Resolution::NoMatch,
        }
    }

    /// Tier containing an already-converted kbps value. Values above every
    /// tier land in the last one.
    pub fn speed_tier_kbps(&self, kbps: Option<f64>) -> Resolution<String> {
        let Some(kbps) = kbps.filter(|v| !v.is_nan()) else {
            return Resolution::Missing;
        };
        if kbps < 0.0 {
            return Resolution::Malformed(format!("negative speed {}", kbps));
        }
        let Some(last) = self.speed_tiers.last() else {
            return Resolution::NoMatch;
        };
        let tier = self
            .speed_tiers
            .iter()
            .find(|tier| tier.contains(kbps))
            .unwrap_or(last);
        Resolution::Matched(tier.id.clone())
    }

    /// Raw speed (unit inferred by [`to_kbps`]) to `velocidad_id`
    pub fn speed_tier(&self, raw: Option<f64>) -> Resolution<String> {
        self.speed_tier_kbps(raw.filter(|v| !v.is_nan()).map(to_kbps))
    }

    /// Technology name or column header to `tecnologia_id`
    pub fn technology(&self, raw: Option<&str>) -> Resolution<String> {
        let Some(raw) = raw else {
            return Resolution::Missing;
        };
        let key = technology_key(raw);
        if key.is_empty() {
            return Resolution::Missing;
        }
        let key = TECHNOLOGY_SYNONYMS
            .iter()
            .find(|(synonym, _)| *synonym == key)
            .map_or(key.clone(), |(_, canonical)| technology_key(canonical));
        match self.technologies.get(&key) {
            Some(id) => Resolution::Matched(id.clone()),
            None => Resolution::NoMatch,
        }
    }

    /// Speed bucket column header to `velocidad_id`
    pub fn speed_bucket(&self, header: &str) -> Resolution<String> {
        let key = compact_key(header);
        if key.is_empty() {
            return Resolution::Missing;
        }
        let name = SPEED_BUCKET_SYNONYMS
            .iter()
            .find(|(synonym, _)| *synonym == key)
            .map(|(_, tier)| *tier);
        let tier = self.speed_tiers.iter().find(|tier| match name {
            Some(name) => tier.name == name,
            None => compact_key(&tier.name) == key,
        });
        match tier {
            Some(tier) => Resolution::Matched(tier.id.clone()),
            None => Resolution::NoMatch,
        }
    }

    /// Service natural key to `servicio_id`
    pub fn service(&self, name: &str) -> Resolution<String> {
        match self.services.get(&normalize_str(name)) {
            Some(id) => Resolution::Matched(id.clone()),
            None => Resolution::NoMatch,
        }
    }

    pub fn speed_tiers(&self) -> &[SpeedTier] {
        &self.speed_tiers
    }

    /// Key set of a foreign key column, for referential closure checks
    pub fn key_set(&self, column: &str) -> Option<HashSet<String>> {
        let keys: HashSet<String> = match column {
            "provincia_id" => self.provinces.values().cloned().collect(),
            "tiempo_id" => self.periods.values().cloned().collect(),
            "tecnologia_id" => self.technologies.values().cloned().collect(),
            "velocidad_id" => self.speed_tiers.iter().map(|t| t.id.clone()).collect(),
            "servicio_id" => self.services.values().cloned().collect(),
            _ => return None,
        };
        Some(keys)
    }
}

fn pairs(
    left: Vec<Option<String>>,
    right: Vec<Option<String>>,
) -> impl Iterator<Item = (String, String)> {
    left.into_iter()
        .zip(right)
        .filter_map(|(l, r)| Some((l?, r?)))
}

/// Tiers in table order. The last tier is always treated as open-ended,
/// whatever sentinel its max column holds.
fn speed_tiers_from(df: &DataFrame) -> Result<Vec<SpeedTier>> {
    let ids = string_values(df, "velocidad_id")?;
    let names = string_values(df, "rango_velocidad")?;
    let mins = f64_values(df, "velocidad_min_kbps")?;
    let maxes = f64_values(df, "velocidad_max_kbps")?;
    let count = ids.len();

    Ok(ids
        .into_iter()
        .zip(names)
        .zip(mins.into_iter().zip(maxes))
        .enumerate()
        .filter_map(|(idx, ((id, name), (min, max)))| {
            Some(SpeedTier {
                id: id?,
                name: name.unwrap_or_default(),
                min_kbps: min.unwrap_or(0.0),
                max_kbps: if idx + 1 == count { None } else { max },
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::catalog::build_speed_tiers_from;
    use tempfile::TempDir;

    fn resolver() -> KeyResolver {
        let temp_dir = TempDir::new().unwrap();
        let config = crate::config::PipelineConfig::from_base_dir(temp_dir.path());
        let dims = DimensionSet::build(&config).unwrap();
        KeyResolver::from_dimensions(&dims).unwrap()
    }

    fn three_tier_resolver() -> KeyResolver {
        let tiers = df!(
            "velocidad_id" => ["VEL1", "VEL2", "VEL3"],
            "rango_velocidad" => ["0-3 Mbps", "3-10 Mbps", "10+ Mbps"],
            "velocidad_min_kbps" => [0i64, 3000, 10000],
            "velocidad_max_kbps" => [3000i64, 10000, 999999]
        )
        .unwrap();
        KeyResolver {
            speed_tiers: speed_tiers_from(&tiers).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_province_resolution_normalizes() {
        let resolver = resolver();
        assert_eq!(
            resolver.province(Some("  Buenos Aires  ")),
            Resolution::Matched("PR01".to_string())
        );
        assert_eq!(
            resolver.province(Some("Neuquén")),
            resolver.province(Some("NEUQUEN"))
        );
        assert_eq!(
            resolver.province(Some("Capital Federal")),
            Resolution::Matched("PR02".to_string())
        );
        assert_eq!(resolver.province(Some("Atlantis")), Resolution::NoMatch);
        assert_eq!(resolver.province(None), Resolution::Missing);
        assert_eq!(resolver.province(Some("   ")), Resolution::Missing);
    }

    #[test]
    fn test_speed_resolution_with_unit_heuristic() {
        let resolver = three_tier_resolver();
        // 2 Mbps -> 2000 kbps
        assert_eq!(resolver.speed_tier(Some(2.0)), Resolution::Matched("VEL1".into()));
        assert_eq!(resolver.speed_tier(Some(5000.0)), Resolution::Matched("VEL2".into()));
        assert_eq!(
            resolver.speed_tier(Some(999_999_999.0)),
            Resolution::Matched("VEL3".into())
        );
        assert_eq!(resolver.speed_tier(None), Resolution::Missing);
        assert_eq!(resolver.speed_tier(Some(f64::NAN)), Resolution::Missing);
        assert!(matches!(
            resolver.speed_tier_kbps(Some(-1.0)),
            Resolution::Malformed(_)
        ));
    }

    #[test]
    fn test_speed_tier_bounds_are_half_open() {
        let resolver = three_tier_resolver();
        assert_eq!(resolver.speed_tier_kbps(Some(2999.0)), Resolution::Matched("VEL1".into()));
        assert_eq!(resolver.speed_tier_kbps(Some(3000.0)), Resolution::Matched("VEL2".into()));
        assert_eq!(resolver.speed_tier_kbps(Some(10000.0)), Resolution::Matched("VEL3".into()));
    }

    #[test]
    fn test_to_kbps_threshold() {
        assert_eq!(to_kbps(49.9), 49_900.0);
        assert_eq!(to_kbps(50.0), 50.0);
        assert_eq!(to_kbps(0.0), 0.0);
    }

    #[test]
    fn test_technology_resolution_uses_synonyms() {
        let resolver = resolver();
        let fiber = resolver.technology(Some("FIBRA_OPTICA")).key().unwrap();
        assert_eq!(resolver.technology(Some("Fibra óptica")).key(), Some(fiber.clone()));
        assert_eq!(resolver.technology(Some("fibraOptica")).key(), Some(fiber.clone()));
        assert_eq!(resolver.technology(Some("FTTH")).key(), Some(fiber));
        assert_eq!(
            resolver.technology(Some("Cablemodem")),
            Resolution::Matched("TEC2".into())
        );
        assert_eq!(
            resolver.technology(Some("dial_up")),
            Resolution::Matched("TEC7".into())
        );
        assert_eq!(resolver.technology(Some("telegraph")), Resolution::NoMatch);
    }

    #[test]
    fn test_speed_bucket_headers() {
        let resolver = resolver();
        assert_eq!(
            resolver.speed_bucket("HASTA 512 kbps"),
            Resolution::Matched("VEL1".into())
        );
        assert_eq!(
            resolver.speed_bucket("+ 30 Mbps"),
            Resolution::Matched("VEL7".into())
        );
        assert_eq!(
            resolver.speed_bucket("6_a_10_mbps"),
            Resolution::Matched("VEL4".into())
        );
        assert_eq!(resolver.speed_bucket("otros"), Resolution::NoMatch);
    }

    #[test]
    fn test_period_and_service() {
        let temp_dir = TempDir::new().unwrap();
        let config = crate::config::PipelineConfig::from_base_dir(temp_dir.path());
        let mut dims = DimensionSet::build(&config).unwrap();
        dims.time.table = crate::dimensions::time::build_time_table(
            vec![(2020, 1), (2020, 2)],
            (2013, 2024),
        )
        .unwrap();
        dims.speed_tiers = build_speed_tiers_from(&[("A", 0), ("B", 100)]).unwrap();
        let resolver = KeyResolver::from_dimensions(&dims).unwrap();

        assert_eq!(
            resolver.period(Some(2020), Some(2)),
            Resolution::Matched("TM02".into())
        );
        assert_eq!(resolver.period(Some(2021), Some(1)), Resolution::NoMatch);
        assert!(matches!(resolver.period(Some(2020), Some(7)), Resolution::Malformed(_)));
        assert_eq!(resolver.period(None, Some(1)), Resolution::Missing);
        assert_eq!(
            resolver.service("tv_paga"),
            Resolution::Matched("SRV5".into())
        );
        assert_eq!(resolver.key_set("velocidad_id").unwrap().len(), 2);
    }

    #[test]
    fn test_resolver_from_written_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let config = crate::config::PipelineConfig::from_base_dir(temp_dir.path());
        let dims = DimensionSet::build(&config).unwrap();
        let dir = temp_dir.path().join("dims");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, table) in dims.tables() {
            let mut table = table.clone();
            let mut file = std::fs::File::create(dir.join(format!("dim_{}.csv", name))).unwrap();
            CsvWriter::new(&mut file).finish(&mut table).unwrap();
        }

        let resolver = KeyResolver::from_dimension_dir(&dir).unwrap();
        assert_eq!(
            resolver.province(Some("tucumán")),
            Resolution::Matched("PR24".into())
        );
        assert_eq!(
            resolver.period(Some(2019), Some(1)),
            Resolution::Matched("TM01".into())
        );
        assert_eq!(
            resolver.speed_tier(Some(1_000_000.0)),
            Resolution::Matched("VEL7".into())
        );
    }
}
