//! Metrics dictionary derived from the unified long table.
//!
//! One row per distinct `(dominio, subcategoria, variable)` describing where
//! the metric comes from, which years and provinces it covers, and a
//! heuristic note about what its values probably are.

use crate::constants::{
    HINT_SEPARATOR, NATIONAL_COVERAGE_NOTE, PENETRATION_NOTE, PENETRATION_SUBCATEGORY,
    SOURCE_FILE_SEPARATOR, UNIFIED_REQUIRED_COLUMNS, VARIABLE_HINTS,
};
use crate::error::{EtlError, Result};
use crate::schema::{has_column, i64_values, is_valid_year_range, require_columns, string_values};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Column order of the dictionary table
pub const DICTIONARY_COLUMNS: [&str; 9] = [
    "dominio",
    "subcategoria",
    "variable",
    "unidad_inferida",
    "archivos_fuente",
    "anios_min_max",
    "observaciones",
    "cobertura_provincias",
    "nota_heuristica",
];

/// Provinces in the country; full coverage earns a note
const PROVINCE_COUNT: usize = 24;

#[derive(Debug, Default)]
struct MetricAccumulator {
    files: BTreeSet<String>,
    unit: Option<String>,
    years: Option<(i64, i64)>,
    rows: i64,
    provinces: HashSet<String>,
}

impl MetricAccumulator {
    fn add(
        &mut self,
        file: Option<String>,
        unit: Option<String>,
        year: Option<i64>,
        province: Option<String>,
    ) {
        self.rows += 1;
        if let Some(file) = file.filter(|f| !f.trim().is_empty()) {
            self.files.insert(file);
        }
        if self.unit.is_none() {
            self.unit = unit.filter(|u| !u.trim().is_empty());
        }
        if let Some(year) = year.filter(|y| (1000..=9999).contains(y)) {
            self.years = Some(match self.years {
                Some((min, max)) => (min.min(year), max.max(year)),
                None => (year, year),
            });
        }
        if let Some(province) = province.filter(|p| !p.trim().is_empty()) {
            self.provinces.insert(province);
        }
    }

    fn year_range(&self) -> String {
        self.years
            .map(|(min, max)| format!("{}-{}", min, max))
            .unwrap_or_default()
    }

    fn coverage(&self) -> Option<i64> {
        if self.provinces.is_empty() {
            None
        } else {
            Some(self.provinces.len() as i64)
        }
    }
}

/// Heuristic note for one metric. Keyword hints only apply when the unit
/// is unknown.
pub fn heuristic_note(
    variable: &str,
    unit: Option<&str>,
    subcategory: &str,
    coverage: Option<i64>,
) -> String {
    let mut notes: Vec<&str> = Vec::new();
    if unit.is_none() {
        let variable = variable.to_lowercase();
        for (keywords, note) in VARIABLE_HINTS {
            if keywords.iter().any(|k| variable.contains(k)) {
                notes.push(note);
            }
        }
    }
    if subcategory == PENETRATION_SUBCATEGORY {
        notes.push(PENETRATION_NOTE);
    }
    if coverage == Some(PROVINCE_COUNT as i64) {
        notes.push(NATIONAL_COVERAGE_NOTE);
    }
    notes.join(HINT_SEPARATOR)
}

/// Build the dictionary, sorted by `(dominio, subcategoria, variable)`.
///
/// Fails with [`EtlError::MissingColumns`] when the unified table lacks any
/// of the required columns. Null group values sort as empty strings.
pub fn build_dictionary(unified: &DataFrame) -> Result<DataFrame> {
    require_columns(unified, "fact_unificado_long", UNIFIED_REQUIRED_COLUMNS)?;

    let height = unified.height();
    let optional_strings = |name: &str| -> Result<Vec<Option<String>>> {
        if has_column(unified, name) {
            string_values(unified, name)
        } else {
            Ok(vec![None; height])
        }
    };

    let domains = string_values(unified, "dominio")?;
    let subcategories = string_values(unified, "subcategoria")?;
    let variables = string_values(unified, "variable")?;
    let files = string_values(unified, "fuente_archivo")?;
    let units = optional_strings("unidad")?;
    let provinces = optional_strings("ProvinciaNorm")?;
    let years = if has_column(unified, "anio") {
        i64_values(unified, "anio")?
    } else {
        vec![None; height]
    };

    let mut groups: BTreeMap<(String, String, String), MetricAccumulator> = BTreeMap::new();
    let rows = domains
        .into_iter()
        .zip(subcategories)
        .zip(variables)
        .zip(files)
        .zip(units)
        .zip(years)
        .zip(provinces);
    for ((((((domain, sub), variable), file), unit), year), province) in rows {
        let key = (
            domain.unwrap_or_default(),
            sub.unwrap_or_default(),
            variable.unwrap_or_default(),
        );
        groups.entry(key).or_default().add(file, unit, year, province);
    }

    let count = groups.len();
    let mut dominio = Vec::with_capacity(count);
    let mut subcategoria = Vec::with_capacity(count);
    let mut variable = Vec::with_capacity(count);
    let mut unidad = Vec::with_capacity(count);
    let mut archivos = Vec::with_capacity(count);
    let mut anios = Vec::with_capacity(count);
    let mut observaciones = Vec::with_capacity(count);
    let mut cobertura = Vec::with_capacity(count);
    let mut notas = Vec::with_capacity(count);

    for ((domain, sub, var), acc) in groups {
        let range = acc.year_range();
        if !is_valid_year_range(&range) {
            return Err(EtlError::InvalidFormat {
                path: PathBuf::from(crate::constants::DICTIONARY_FILE),
                reason: format!("year range {:?} for {}/{}/{}", range, domain, sub, var),
            });
        }
        let coverage = acc.coverage();
        notas.push(heuristic_note(&var, acc.unit.as_deref(), &sub, coverage));
        archivos.push(
            acc.files
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(SOURCE_FILE_SEPARATOR),
        );
        unidad.push(acc.unit);
        anios.push(range);
        observaciones.push(acc.rows);
        cobertura.push(coverage);
        dominio.push(domain);
        subcategoria.push(sub);
        variable.push(var);
    }

    let dictionary = DataFrame::new(vec![
        Column::new("dominio".into(), dominio),
        Column::new("subcategoria".into(), subcategoria),
        Column::new("variable".into(), variable),
        Column::new("unidad_inferida".into(), unidad),
        Column::new("archivos_fuente".into(), archivos),
        Column::new("anios_min_max".into(), anios),
        Column::new("observaciones".into(), observaciones),
        Column::new("cobertura_provincias".into(), cobertura),
        Column::new("nota_heuristica".into(), notas),
    ])?;
    debug!(
        "Metrics dictionary: {} metrics from {} unified rows",
        dictionary.height(),
        height
    );
    Ok(dictionary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_groups_and_sorts() {
        let unified = df!(
            "anio" => [Some(2014i64), Some(2022), Some(2020), None],
            "ProvinciaNorm" => [Some("SALTA"), Some("JUJUY"), None, None],
            "dominio" => ["Movil", "Internet", "Internet", "Internet"],
            "subcategoria" => ["accesos", "accesos", "accesos", "accesos"],
            "variable" => ["prepago", "mbps", "mbps", "mbps"],
            "valor" => [1.0f64, 2.0, 3.0, 4.0],
            "fuente_archivo" => ["m.csv", "b.csv", "a.csv", "b.csv"]
        )
        .unwrap();

        let dict = build_dictionary(&unified).unwrap();
        assert_eq!(dict.get_column_names_str(), DICTIONARY_COLUMNS.to_vec());
        assert_eq!(dict.height(), 2);
        assert_eq!(
            string_values(&dict, "dominio").unwrap(),
            vec![Some("Internet".to_string()), Some("Movil".to_string())]
        );
        assert_eq!(
            string_values(&dict, "archivos_fuente").unwrap()[0].as_deref(),
            Some("a.csv;b.csv")
        );
        assert_eq!(
            string_values(&dict, "anios_min_max").unwrap()[0].as_deref(),
            Some("2020-2022")
        );
        assert_eq!(i64_values(&dict, "observaciones").unwrap()[0], Some(3));
        assert_eq!(i64_values(&dict, "cobertura_provincias").unwrap()[0], Some(1));
        assert_eq!(
            string_values(&dict, "nota_heuristica").unwrap(),
            vec![
                Some("Posible unidad Mbps".to_string()),
                Some("Conteo de accesos/líneas".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_columns_is_an_error() {
        let unified = df!(
            "dominio" => ["Internet"],
            "variable" => ["mbps"],
            "valor" => [1.0f64]
        )
        .unwrap();
        match build_dictionary(&unified) {
            Err(EtlError::MissingColumns { columns, .. }) => {
                assert_eq!(
                    columns,
                    vec!["subcategoria".to_string(), "fuente_archivo".to_string()]
                );
            }
            other => panic!("Expected MissingColumns, got {:?}", other.map(|d| d.shape())),
        }
    }

    #[test]
    fn test_group_without_years_or_provinces() {
        let unified = df!(
            "dominio" => ["Postal"],
            "subcategoria" => ["general"],
            "variable" => ["envios"],
            "valor" => [5.0f64],
            "fuente_archivo" => ["postal.csv"]
        )
        .unwrap();
        let dict = build_dictionary(&unified).unwrap();
        assert_eq!(
            string_values(&dict, "anios_min_max").unwrap()[0].as_deref(),
            Some("")
        );
        assert_eq!(i64_values(&dict, "cobertura_provincias").unwrap()[0], None);
        assert_eq!(
            string_values(&dict, "nota_heuristica").unwrap()[0].as_deref(),
            Some("")
        );
    }

    #[test]
    fn test_heuristic_notes() {
        assert_eq!(heuristic_note("ingresos_miles_pesos", None, "ingresos", None), "Monto monetario");
        assert_eq!(heuristic_note("mbps", Some("Mbps"), "x", None), "");
        assert_eq!(
            heuristic_note("accesos_por_cada_100_hogares", None, "penetracion", Some(24)),
            "Conteo de accesos/líneas | Indicador relativo (por 100 hab/hog) | Cobertura nacional completa"
        );
        assert_eq!(heuristic_note("minutos_sms", None, "x", None), "Mensajes SMS | Minutos de tráfico");
    }
}
