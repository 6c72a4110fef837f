//! Static reference catalogs and lookup tables.
//!
//! Provinces, technologies, speed tiers and services are fixed domain
//! knowledge and are never inferred from raw files. The remap tables here
//! are the only place where spellings that survive normalization are
//! reconciled; they are ported literally from the observed data.

// =============================================================================
// Directory Layout and File Names
// =============================================================================

/// Raw spreadsheet directory, relative to the base directory
pub const RAW_DIR: &str = "data/raw";

/// Cleaned CSV directory, relative to the base directory
pub const PROCESSED_DIR: &str = "data/processed";

/// Dimension and per-file fact tables
pub const DIMENSIONAL_DIR: &str = "data/processed/dimensional";

/// Curated extracts, unified fact table and metrics dictionary
pub const OUT_DIR: &str = "data/processed/out";

/// Dense-integer dimensions for BI tools
pub const BI_DIR: &str = "data/processed/bi";

/// Suffix appended to the raw stem by the clean stage
pub const CLEAN_SUFFIX: &str = "_clean";

/// Spreadsheet extensions accepted as raw input
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "ods"];

pub const SUMMARY_FILE: &str = "resumen_datos.csv";
pub const UNIFIED_FACT_STEM: &str = "fact_unificado_long";
pub const DICTIONARY_FILE: &str = "diccionario_metricas.csv";
pub const REPORT_FILE: &str = "etl_report.md";

/// Cleaned table stem to the curated fact extract published from it
pub const CURATED_FACTS: &[(&str, &str)] = &[
    (
        "internet_accesos_penetracion_provincias",
        "fact_penetracion_provincias",
    ),
    (
        "internet_velocidad_media_descarga_provincias",
        "fact_velocidad_media_provincias",
    ),
    (
        "internet_accesos_velocidad_provincias",
        "fact_velocidad_numerica_provincias",
    ),
    (
        "internet_accesos_velocidad_rangos_provincias",
        "fact_velocidad_rangos_long",
    ),
    (
        "internet_accesos_tecnologias_provincias",
        "fact_tecnologias_long",
    ),
];

/// Measurement columns published as floats in curated extracts
pub const CURATED_RATE_COLUMNS: &[&str] = &[
    "mbps",
    "velocidad",
    "accesos_cada_100_hogares",
    "accesos_cada_100_habitantes",
];

// =============================================================================
// Time Dimension Defaults
// =============================================================================

/// Inclusive window of years accepted into the time dimension
pub const VALID_YEAR_RANGE: (i32, i32) = (2013, 2024);

/// Years used when the driving table is missing or unusable
pub const FALLBACK_YEARS: (i32, i32) = (2019, 2022);

/// Raw table whose `(anio, trimestre)` pairs drive the time dimension
pub const TIME_SOURCE_STEM: &str = "internet_accesos_baf_provincias";

/// Number of leading rows tried as header when the first row is not all text
pub const HEADER_CANDIDATE_ROWS: usize = 5;

// =============================================================================
// Speed Handling
// =============================================================================

/// Raw speeds strictly below this value are read as Mbps, otherwise kbps.
pub const MBPS_THRESHOLD: f64 = 50.0;

/// Value written as `velocidad_max_kbps` for the open-ended last tier
pub const OPEN_ENDED_MAX_KBPS: i64 = 999_999;

// =============================================================================
// Province Catalog
// =============================================================================

/// Static province record; `name` is already in canonical form.
#[derive(Debug, Clone, Copy)]
pub struct ProvinceRecord {
    pub name: &'static str,
    pub region: &'static str,
    pub population: i64,
    pub area_km2: i64,
    pub capital: &'static str,
}

const fn province(
    name: &'static str,
    region: &'static str,
    population: i64,
    area_km2: i64,
    capital: &'static str,
) -> ProvinceRecord {
    ProvinceRecord {
        name,
        region,
        population,
        area_km2,
        capital,
    }
}

/// The 24 first-level divisions in key order (`PR01..PR24`).
pub const PROVINCES: [ProvinceRecord; 24] = [
    province("BUENOS AIRES", "PAMPEANA", 17_569_053, 307_571, "LA PLATA"),
    province("CABA", "PAMPEANA", 3_075_646, 200, "CABA"),
    province(
        "CATAMARCA",
        "NOA",
        429_556,
        102_602,
        "SAN FERNANDO DEL VALLE DE CATAMARCA",
    ),
    province("CHACO", "NEA", 1_204_541, 99_633, "RESISTENCIA"),
    province("CHUBUT", "PATAGONIA", 618_994, 224_686, "RAWSON"),
    province("CORDOBA", "PAMPEANA", 3_978_984, 165_321, "CORDOBA"),
    province("CORRIENTES", "NEA", 1_120_801, 88_199, "CORRIENTES"),
    province("ENTRE RIOS", "PAMPEANA", 1_426_426, 78_781, "PARANA"),
    province("FORMOSA", "NEA", 606_041, 72_066, "FORMOSA"),
    province("JUJUY", "NOA", 770_881, 53_219, "SAN SALVADOR DE JUJUY"),
    province("LA PAMPA", "PAMPEANA", 364_488, 143_440, "SANTA ROSA"),
    province("LA RIOJA", "NOA", 393_531, 89_680, "LA RIOJA"),
    province("MENDOZA", "CUYO", 2_014_533, 148_827, "MENDOZA"),
    province("MISIONES", "NEA", 1_261_294, 29_801, "POSADAS"),
    province("NEUQUEN", "PATAGONIA", 726_590, 94_078, "NEUQUEN"),
    province("RIO NEGRO", "PATAGONIA", 747_610, 203_013, "VIEDMA"),
    province("SALTA", "NOA", 1_424_397, 155_488, "SALTA"),
    province("SAN JUAN", "CUYO", 789_489, 89_651, "SAN JUAN"),
    province("SAN LUIS", "CUYO", 508_328, 76_748, "SAN LUIS"),
    province("SANTA CRUZ", "PATAGONIA", 374_756, 243_943, "RIO GALLEGOS"),
    province("SANTA FE", "PAMPEANA", 3_563_390, 133_007, "SANTA FE"),
    province(
        "SANTIAGO DEL ESTERO",
        "NOA",
        978_313,
        136_351,
        "SANTIAGO DEL ESTERO",
    ),
    province("TIERRA DEL FUEGO", "PATAGONIA", 190_641, 21_263, "USHUAIA"),
    province("TUCUMAN", "NOA", 1_703_186, 22_524, "SAN MIGUEL DE TUCUMAN"),
];

/// Normalized raw spellings that name a catalog province differently.
pub const PROVINCE_ALIASES: &[(&str, &str)] = &[
    ("CAPITAL FEDERAL", "CABA"),
    ("CIUDAD AUTONOMA DE BUENOS AIRES", "CABA"),
    ("CIUDAD DE BUENOS AIRES", "CABA"),
    (
        "TIERRA DEL FUEGO, ANTARTIDA E ISLAS DEL ATLANTICO SUR",
        "TIERRA DEL FUEGO",
    ),
];

// =============================================================================
// Technology Catalog
// =============================================================================

/// Technology categories accepted in `dim_tecnologias.categoria`
pub mod technology_categories {
    pub const INTERNET_FIJO: &str = "INTERNET_FIJO";
    pub const INTERNET_MOVIL: &str = "INTERNET_MOVIL";
    pub const TELEFONIA_FIJA: &str = "TELEFONIA_FIJA";
    pub const TV_PAGA: &str = "TV_PAGA";
    pub const TV_ABIERTA: &str = "TV_ABIERTA";

    pub const ALL: &[&str] = &[INTERNET_FIJO, INTERNET_MOVIL, TELEFONIA_FIJA, TV_PAGA, TV_ABIERTA];
}

/// `(tecnologia, categoria, descripcion)` in key order (`TEC1..`)
pub const TECHNOLOGIES: &[(&str, &str, &str)] = &[
    ("ADSL", "INTERNET_FIJO", "Asymmetric Digital Subscriber Line"),
    ("CABLE_MODEM", "INTERNET_FIJO", "Internet por cable coaxial"),
    ("FIBRA_OPTICA", "INTERNET_FIJO", "Fiber To The Home/Building"),
    ("WIRELESS", "INTERNET_FIJO", "Internet inalámbrico fijo"),
    ("OTROS", "INTERNET_FIJO", "Otras tecnologías de internet fijo"),
    ("SATELITAL", "INTERNET_FIJO", "Internet satelital"),
    ("DIAL_UP", "INTERNET_FIJO", "Conexión telefónica"),
    ("LTE", "INTERNET_MOVIL", "Long Term Evolution 4G"),
    ("3G", "INTERNET_MOVIL", "Tercera generación móvil"),
    ("5G", "INTERNET_MOVIL", "Quinta generación móvil"),
    ("TELEFONIA_FIJA", "TELEFONIA_FIJA", "Líneas de telefonía fija"),
    ("TV_CABLE", "TV_PAGA", "Televisión por cable"),
    ("TV_SATELITAL", "TV_PAGA", "Televisión satelital"),
    ("IPTV", "TV_PAGA", "Internet Protocol Television"),
    ("TDA", "TV_ABIERTA", "Televisión digital abierta"),
];

/// Raw technology header (as produced by `normalize::technology_key`) to
/// catalog technology name.
pub const TECHNOLOGY_SYNONYMS: &[(&str, &str)] = &[
    ("adsl", "ADSL"),
    ("cablemodem", "CABLE_MODEM"),
    ("fibraoptica", "FIBRA_OPTICA"),
    ("wireless", "WIRELESS"),
    ("otros", "OTROS"),
    ("otrosinternet", "OTROS"),
    ("satelital", "SATELITAL"),
    ("dialup", "DIAL_UP"),
    ("ftth", "FIBRA_OPTICA"),
    ("hfc", "CABLE_MODEM"),
    ("telefonicabasica", "TELEFONIA_FIJA"),
    ("telefoniabasica", "TELEFONIA_FIJA"),
    ("4g", "LTE"),
];

// =============================================================================
// Speed Tier Catalog
// =============================================================================

/// `(rango_velocidad, min_kbps)`; each tier ends where the next begins and
/// the last one is open-ended.
pub const SPEED_TIERS: &[(&str, i64)] = &[
    ("HASTA_512_KBPS", 0),
    ("512_KBPS_A_1_MBPS", 512),
    ("1_A_6_MBPS", 1_024),
    ("6_A_10_MBPS", 6_144),
    ("10_A_20_MBPS", 10_240),
    ("20_A_30_MBPS", 20_480),
    ("MAS_30_MBPS", 30_720),
];

/// Speed bucket headers (as produced by `normalize::compact_key`) to the
/// tier name they count.
pub const SPEED_BUCKET_SYNONYMS: &[(&str, &str)] = &[
    ("hasta512kbps", "HASTA_512_KBPS"),
    ("512kbps1mbps", "512_KBPS_A_1_MBPS"),
    ("512kbpsa1mbps", "512_KBPS_A_1_MBPS"),
    ("entre512kbpsy1mbps", "512_KBPS_A_1_MBPS"),
    ("1mbps6mbps", "1_A_6_MBPS"),
    ("1a6mbps", "1_A_6_MBPS"),
    ("entre1mbpsy6mbps", "1_A_6_MBPS"),
    ("6mbps10mbps", "6_A_10_MBPS"),
    ("6a10mbps", "6_A_10_MBPS"),
    ("entre6mbpsy10mbps", "6_A_10_MBPS"),
    ("10mbps20mbps", "10_A_20_MBPS"),
    ("10a20mbps", "10_A_20_MBPS"),
    ("entre10mbpsy20mbps", "10_A_20_MBPS"),
    ("20mbps30mbps", "20_A_30_MBPS"),
    ("20a30mbps", "20_A_30_MBPS"),
    ("entre20mbpsy30mbps", "20_A_30_MBPS"),
    ("30mbps", "MAS_30_MBPS"),
    ("mas30mbps", "MAS_30_MBPS"),
    ("masde30mbps", "MAS_30_MBPS"),
];

// =============================================================================
// Service Catalog
// =============================================================================

/// `(servicio, categoria, descripcion)` in key order (`SRV1..`)
pub const SERVICES: &[(&str, &str, &str)] = &[
    ("INTERNET_FIJO", "CONECTIVIDAD", "Servicio de internet fijo"),
    ("INTERNET_MOVIL", "CONECTIVIDAD", "Servicio de internet móvil"),
    ("TELEFONIA_FIJA", "TELEFONIA", "Servicio de telefonía fija"),
    ("TELEFONIA_MOVIL", "TELEFONIA", "Servicio de telefonía móvil"),
    ("TV_PAGA", "ENTRETENIMIENTO", "Servicio de televisión paga"),
    ("MERCADO_POSTAL", "POSTAL", "Servicios postales"),
];

/// Revenue file stem fragment to the service it reports, first match wins.
pub const REVENUE_SERVICE_RULES: &[(&str, &str)] = &[
    ("internet", "INTERNET_FIJO"),
    ("comunicaciones_moviles", "INTERNET_MOVIL"),
    ("telefonia_fija", "TELEFONIA_FIJA"),
    ("tv", "TV_PAGA"),
];

// =============================================================================
// Unification and Dictionary
// =============================================================================

/// Stem prefix to business domain, first match wins.
pub const DOMAIN_RULES: &[(&str, &str)] = &[
    ("internet_", "Internet"),
    ("comunicaciones_moviles_", "Movil"),
    ("movil_", "Movil"),
    ("telefonia_fija_", "TelefoniaFija"),
    ("tv_", "TV"),
    ("postal_", "Postal"),
    ("mercado_postal_", "Postal"),
    ("portabilidad_", "Portabilidad"),
];

/// Columns that identify an observation rather than measure it
pub const IDENTIFIER_COLUMNS: &[&str] = &[
    "anio",
    "trimestre",
    "mes",
    "provincia",
    "provincia_id",
    "tiempo_id",
    "ProvinciaNorm",
    "periodo",
];

/// Cleaned header spellings that name an identifier column differently
pub const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("año", "anio"),
    ("ano", "anio"),
    ("year", "anio"),
    ("trim", "trimestre"),
    ("quarter", "trimestre"),
    ("provincias", "provincia"),
];

/// Extra columns excluded when unpivoting technology and speed-range tables
pub const WIDE_TABLE_TOTAL_COLUMNS: &[&str] = &["total"];

/// Columns the metrics dictionary cannot be built without
pub const UNIFIED_REQUIRED_COLUMNS: &[&str] =
    &["dominio", "subcategoria", "variable", "valor", "fuente_archivo"];

/// Keyword groups checked against lowercase variable names when no unit is
/// known, paired with the note they add.
pub const VARIABLE_HINTS: &[(&[&str], &str)] = &[
    (&["mbps", "velocidad"], "Posible unidad Mbps"),
    (
        &["accesos", "prepago", "pospago", "hogares"],
        "Conteo de accesos/líneas",
    ),
    (&["ingresos", "pesos"], "Monto monetario"),
    (&["sms"], "Mensajes SMS"),
    (&["minutos"], "Minutos de tráfico"),
];

pub const PENETRATION_SUBCATEGORY: &str = "penetracion";
pub const PENETRATION_NOTE: &str = "Indicador relativo (por 100 hab/hog)";
pub const NATIONAL_COVERAGE_NOTE: &str = "Cobertura nacional completa";
pub const HINT_SEPARATOR: &str = " | ";
pub const SOURCE_FILE_SEPARATOR: &str = ";";
