//! Curated extracts for analytics tools
//!
//! Republishes dimension tables with the extra columns dashboards join on:
//! normalized province names, numeric speed bounds with a sort order, and
//! dense integer ids for tools that cannot key on text. Selected cleaned
//! tables are republished as keyed fact extracts with the same join
//! columns.

use crate::config::PipelineConfig;
use crate::constants::{CLEAN_SUFFIX, CURATED_FACTS, CURATED_RATE_COLUMNS};
use crate::dimensions::dimension_path;
use crate::error::{EtlError, Result};
use crate::models::FactKind;
use crate::normalize::{compact_key, normalize_str, technology_key};
use crate::processor::facts::build_fact;
use crate::processor::writer::TableWriter;
use crate::reshape::count_values;
use crate::resolver::KeyResolver;
use crate::schema::{f64_values, has_column, i64_values, read_csv_table, string_values};
use polars::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

/// Dimension tables re-read from the dimensional directory, with the
/// resolver built from them
#[derive(Debug, Clone)]
pub struct CurationInputs {
    pub time: DataFrame,
    pub provinces: DataFrame,
    pub technologies: DataFrame,
    pub speed_tiers: DataFrame,
    pub resolver: KeyResolver,
}

impl CurationInputs {
    pub fn load(config: &PipelineConfig) -> Result<Self> {
        let read = |name: &str| read_csv_table(&dimension_path(&config.dimensional_dir, name), true);
        let time = read("tiempo")?;
        let provinces = read("provincias")?;
        let technologies = read("tecnologias")?;
        let speed_tiers = read("velocidades")?;
        let resolver = KeyResolver::from_tables(
            &time,
            &provinces,
            &technologies,
            &speed_tiers,
            &read("servicios")?,
        )?;
        Ok(Self {
            time,
            provinces,
            technologies,
            speed_tiers,
            resolver,
        })
    }
}

/// Province dimension plus `ProvinciaNorm`
pub fn provinces_norm(provinces: &DataFrame) -> Result<DataFrame> {
    let mut out = provinces.clone();
    let norm: Vec<Option<String>> = string_values(provinces, "provincia")?
        .into_iter()
        .map(|p| p.map(|p| normalize_str(&p)))
        .collect();
    out.with_column(Column::new("ProvinciaNorm".into(), norm))?;
    Ok(out)
}

/// Time dimension with typed year and quarter plus the quarter start date
pub fn time_norm(time: &DataFrame) -> Result<DataFrame> {
    let years = i64_values(time, "anio")?;
    let quarters = i64_values(time, "trimestre")?;
    let starts: Vec<Option<String>> = years
        .iter()
        .zip(&quarters)
        .map(|(y, q)| match (y, q) {
            (Some(y), Some(q)) => Some(format!("{:04}-{:02}-01", y, (q - 1) * 3 + 1)),
            _ => None,
        })
        .collect();

    let mut out = time.clone();
    out.with_column(Column::new("anio".into(), years))?;
    out.with_column(Column::new("trimestre".into(), quarters))?;
    out.with_column(Column::new("fecha_inicio".into(), starts))?;
    Ok(out)
}

/// Speed tiers with numeric bounds, display order and a join key
pub fn speed_tiers_ready(tiers: &DataFrame) -> Result<DataFrame> {
    let names = string_values(tiers, "rango_velocidad")?;
    let keys: Vec<Option<String>> = names
        .iter()
        .map(|n| n.as_deref().map(compact_key))
        .collect();
    let order: Vec<i64> = (1..=tiers.height() as i64).collect();

    let mut out = tiers.clone();
    out.with_column(Column::new(
        "vel_min_kbps".into(),
        i64_values(tiers, "velocidad_min_kbps")?,
    ))?;
    out.with_column(Column::new(
        "vel_max_kbps".into(),
        i64_values(tiers, "velocidad_max_kbps")?,
    ))?;
    out.with_column(Column::new("orden".into(), order))?;
    out.with_column(Column::new("rango_key".into(), keys))?;
    Ok(out)
}

/// Technologies with the lookup key used for header matching
pub fn technologies_ready(technologies: &DataFrame) -> Result<DataFrame> {
    let keys: Vec<Option<String>> = string_values(technologies, "tecnologia")?
        .into_iter()
        .map(|t| t.map(|t| technology_key(&t)))
        .collect();
    let mut out = technologies.clone();
    out.with_column(Column::new("tec_key".into(), keys))?;
    Ok(out)
}

/// Replace the text key column with dense ids `1..N` in table order and
/// keep the original key under `codigo_column`.
pub fn with_dense_ids(df: &DataFrame, id_column: &str, codigo_column: &str) -> Result<DataFrame> {
    let codes = df.column(id_column)?.clone().with_name(codigo_column.into());
    let ids: Vec<i64> = (1..=df.height() as i64).collect();

    let mut out = df.clone();
    out.with_column(Column::new(id_column.into(), ids))?;
    out.with_column(codes)?;
    Ok(out)
}

/// Curated dimension outputs in write order
pub fn curated_dimension_paths(config: &PipelineConfig) -> [PathBuf; 8] {
    [
        config.out_dir.join("dim_provincias_norm.csv"),
        config.out_dir.join("dim_tiempo_norm.csv"),
        config.out_dir.join("dim_velocidades_ready.csv"),
        config.out_dir.join("dim_tecnologias_ready.csv"),
        config.bi_dir.join("dim_provincias.csv"),
        config.bi_dir.join("dim_velocidades.csv"),
        config.bi_dir.join("dim_tiempo.csv"),
        config.bi_dir.join("dim_tecnologias.csv"),
    ]
}

/// Build and write every curated dimension. Returns `(path, rows)` per file.
pub fn write_curated_dimensions(
    inputs: &CurationInputs,
    config: &PipelineConfig,
    writer: &TableWriter,
) -> Result<Vec<(PathBuf, usize)>> {
    let tables = [
        provinces_norm(&inputs.provinces)?,
        time_norm(&inputs.time)?,
        speed_tiers_ready(&inputs.speed_tiers)?,
        technologies_ready(&inputs.technologies)?,
        with_dense_ids(&inputs.provinces, "provincia_id", "provincia_codigo")?,
        with_dense_ids(&inputs.speed_tiers, "velocidad_id", "velocidad_codigo")?,
        with_dense_ids(&inputs.time, "tiempo_id", "tiempo_codigo")?,
        with_dense_ids(&inputs.technologies, "tecnologia_id", "tecnologia_codigo")?,
    ];

    let mut written = Vec::with_capacity(tables.len());
    for (path, mut table) in curated_dimension_paths(config).into_iter().zip(tables) {
        let rows = writer.write_csv(&mut table, &path)?;
        written.push((path, rows));
    }
    debug!("Wrote {} curated dimensions", written.len());
    Ok(written)
}

/// One curated fact extract: the cleaned table it reads and the file it
/// writes
#[derive(Debug, Clone, PartialEq)]
pub struct CuratedFact {
    pub stem: &'static str,
    pub source: PathBuf,
    pub target: PathBuf,
}

/// Every curated fact extract for `config`
pub fn curated_facts(config: &PipelineConfig) -> Vec<CuratedFact> {
    CURATED_FACTS
        .iter()
        .map(|&(stem, name)| CuratedFact {
            stem,
            source: config
                .processed_dir
                .join(format!("{}{}.csv", stem, CLEAN_SUFFIX)),
            target: config.out_dir.join(format!("{}.csv", name)),
        })
        .collect()
}

/// Keyed fact table for a cleaned table, with typed period columns,
/// `ProvinciaNorm`, float rates, zero-filled `accesos` and, for technology
/// tables, the `tec_key` of the matched technology.
pub fn curate_fact(df: &DataFrame, stem: &str, inputs: &CurationInputs) -> Result<DataFrame> {
    let kind = FactKind::from_stem(stem).ok_or_else(|| EtlError::InvalidFormat {
        path: PathBuf::from(stem),
        reason: "no fact kind for curated extract".to_string(),
    })?;
    let mut fact = build_fact(df, &kind, &inputs.resolver)?;

    for column in ["anio", "trimestre"] {
        if has_column(&fact, column) {
            let values = i64_values(&fact, column)?;
            fact.with_column(Column::new(column.into(), values))?;
        }
    }
    if has_column(&fact, "provincia") {
        let norm: Vec<Option<String>> = string_values(&fact, "provincia")?
            .into_iter()
            .map(|p| p.map(|p| normalize_str(&p)))
            .collect();
        fact.with_column(Column::new("ProvinciaNorm".into(), norm))?;
    }
    for &column in CURATED_RATE_COLUMNS {
        if has_column(&fact, column) {
            let values = f64_values(&fact, column)?;
            fact.with_column(Column::new(column.into(), values))?;
        }
    }
    if has_column(&fact, "accesos") {
        let counts = count_values(&fact, "accesos")?;
        fact.with_column(Column::new("accesos".into(), counts))?;
    }
    if has_column(&fact, "tecnologia_id") {
        attach_technology_keys(&mut fact, &inputs.technologies)?;
    }
    Ok(fact)
}

/// `tec_key` of the matched technology, or of the raw header when the
/// header matched nothing
fn attach_technology_keys(fact: &mut DataFrame, technologies: &DataFrame) -> Result<()> {
    let by_id: HashMap<String, String> = string_values(technologies, "tecnologia_id")?
        .into_iter()
        .zip(string_values(technologies, "tecnologia")?)
        .filter_map(|(id, name)| Some((id?, technology_key(&name?))))
        .collect();
    let keys: Vec<Option<String>> = string_values(fact, "tecnologia_id")?
        .into_iter()
        .zip(string_values(fact, "tecnologia")?)
        .map(|(id, raw)| match id.and_then(|id| by_id.get(&id).cloned()) {
            Some(key) => Some(key),
            None => raw.map(|raw| technology_key(&raw)),
        })
        .collect();
    fact.with_column(Column::new("tec_key".into(), keys))?;
    Ok(())
}

/// Read, curate and write one fact extract. Returns the rows written.
pub fn write_curated_fact(
    extract: &CuratedFact,
    inputs: &CurationInputs,
    writer: &TableWriter,
) -> Result<usize> {
    let df = read_csv_table(&extract.source, true)?;
    let mut fact = curate_fact(&df, extract.stem, inputs)?;
    let rows = writer.write_csv(&mut fact, &extract.target)?;
    debug!(
        "Curated {} -> {} ({} rows)",
        extract.source.display(),
        extract.target.display(),
        rows
    );
    Ok(rows)
}

/// Every file the curate stage may publish
pub fn curated_outputs(config: &PipelineConfig) -> Vec<PathBuf> {
    curated_dimension_paths(config)
        .into_iter()
        .chain(curated_facts(config).into_iter().map(|f| f.target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionSet;
    use crate::dimensions::time::build_time_table;
    use tempfile::TempDir;

    fn inputs() -> CurationInputs {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_base_dir(temp_dir.path());
        let mut dims = DimensionSet::build(&config).unwrap();
        dims.time.table = build_time_table(vec![(2022, 1), (2022, 2)], (2013, 2024)).unwrap();
        CurationInputs {
            resolver: KeyResolver::from_dimensions(&dims).unwrap(),
            time: dims.time.table,
            provinces: dims.provinces,
            technologies: dims.technologies,
            speed_tiers: dims.speed_tiers,
        }
    }

    #[test]
    fn test_speed_tiers_ready() {
        let ready = speed_tiers_ready(&inputs().speed_tiers).unwrap();
        assert_eq!(
            i64_values(&ready, "orden").unwrap()[..3],
            [Some(1), Some(2), Some(3)]
        );
        assert_eq!(
            string_values(&ready, "rango_key").unwrap()[0].as_deref(),
            Some("hasta512kbps")
        );
        assert_eq!(i64_values(&ready, "vel_max_kbps").unwrap().last(), Some(&Some(999_999)));
    }

    #[test]
    fn test_dense_ids_keep_codes() {
        let bi = with_dense_ids(&inputs().provinces, "provincia_id", "provincia_codigo").unwrap();
        assert_eq!(i64_values(&bi, "provincia_id").unwrap()[23], Some(24));
        assert_eq!(
            string_values(&bi, "provincia_codigo").unwrap()[0].as_deref(),
            Some("PR01")
        );
    }

    #[test]
    fn test_time_norm_start_dates() {
        let norm = time_norm(&inputs().time).unwrap();
        let starts = string_values(&norm, "fecha_inicio").unwrap();
        assert_eq!(starts[0].as_deref(), Some("2022-01-01"));
        assert_eq!(starts[1].as_deref(), Some("2022-04-01"));
    }

    #[test]
    fn test_write_curated_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let config = PipelineConfig::from_base_dir(temp_dir.path());
        let writer = TableWriter::new(&config);

        let written = write_curated_dimensions(&inputs(), &config, &writer).unwrap();
        assert_eq!(written.len(), 8);
        assert!(config.out_dir.join("dim_provincias_norm.csv").exists());
        assert!(config.bi_dir.join("dim_velocidades.csv").exists());
        assert_eq!(written[0].1, 24);

        let bi_time = read_csv_table(&config.bi_dir.join("dim_tiempo.csv"), true).unwrap();
        assert_eq!(i64_values(&bi_time, "tiempo_id").unwrap(), vec![Some(1), Some(2)]);
        assert_eq!(
            string_values(&bi_time, "tiempo_codigo").unwrap()[1].as_deref(),
            Some("TM02")
        );
        let bi_tech = read_csv_table(&config.bi_dir.join("dim_tecnologias.csv"), true).unwrap();
        assert_eq!(
            string_values(&bi_tech, "tecnologia_codigo").unwrap()[0].as_deref(),
            Some("TEC1")
        );
    }

    #[test]
    fn test_curated_technologies_carry_join_keys() {
        let df = df!(
            "anio" => ["2022", "2022"],
            "trimestre" => ["1", "2"],
            "provincia" => ["Neuquén", "Salta"],
            "fibra_óptica" => ["40", ""],
            "telefónica básica" => ["1", "2"],
            "total" => ["41", "2"]
        )
        .unwrap();
        let fact = curate_fact(&df, "internet_accesos_tecnologias_provincias", &inputs()).unwrap();

        assert_eq!(fact.height(), 4);
        assert_eq!(fact.column("anio").unwrap().dtype(), &DataType::Int64);
        assert_eq!(
            string_values(&fact, "ProvinciaNorm").unwrap()[0].as_deref(),
            Some("NEUQUEN")
        );
        assert_eq!(
            string_values(&fact, "tec_key").unwrap(),
            ["fibraoptica", "fibraoptica", "telefoniafija", "telefoniafija"]
                .iter()
                .map(|s| Some(s.to_string()))
                .collect::<Vec<_>>()
        );
        assert_eq!(
            i64_values(&fact, "accesos").unwrap(),
            vec![Some(40), Some(0), Some(1), Some(2)]
        );
        assert_eq!(
            string_values(&fact, "tiempo_id").unwrap(),
            vec![
                Some("TM01".to_string()),
                Some("TM02".to_string()),
                Some("TM01".to_string()),
                Some("TM02".to_string())
            ]
        );
    }

    #[test]
    fn test_curated_speed_extracts() {
        let inputs = inputs();
        let mean = df!(
            "anio" => ["2022"],
            "trimestre" => ["1"],
            "provincia" => ["Salta"],
            "mbps" => ["2.5"]
        )
        .unwrap();
        let fact =
            curate_fact(&mean, "internet_velocidad_media_descarga_provincias", &inputs).unwrap();
        assert_eq!(f64_values(&fact, "mbps").unwrap(), vec![Some(2.5)]);
        assert_eq!(
            string_values(&fact, "velocidad_id").unwrap(),
            vec![Some("VEL3".to_string())]
        );

        let numeric = df!(
            "anio" => ["2022", "2022"],
            "trimestre" => ["1", "1"],
            "provincia" => ["Salta", "Salta"],
            "velocidad" => ["20", "512"],
            "accesos" => ["7", ""]
        )
        .unwrap();
        let fact = curate_fact(&numeric, "internet_accesos_velocidad_provincias", &inputs).unwrap();
        assert_eq!(
            f64_values(&fact, "Velocidad_kbps").unwrap(),
            vec![Some(20_000.0), Some(512.0)]
        );
        assert_eq!(
            string_values(&fact, "velocidad_id").unwrap(),
            vec![Some("VEL5".to_string()), Some("VEL2".to_string())]
        );
        assert_eq!(i64_values(&fact, "accesos").unwrap(), vec![Some(7), Some(0)]);
    }

    #[test]
    fn test_curated_fact_paths() {
        let config = PipelineConfig::from_base_dir(std::path::Path::new("/srv/etl"));
        let facts = curated_facts(&config);
        assert_eq!(facts.len(), 5);
        assert_eq!(
            facts[4].source,
            config
                .processed_dir
                .join("internet_accesos_tecnologias_provincias_clean.csv")
        );
        assert_eq!(facts[4].target, config.out_dir.join("fact_tecnologias_long.csv"));
        assert_eq!(curated_outputs(&config).len(), 13);
    }
}
