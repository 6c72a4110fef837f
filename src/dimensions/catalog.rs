//! Dimensions built from the static catalogs.

use crate::constants::{OPEN_ENDED_MAX_KBPS, PROVINCES, SERVICES, SPEED_TIERS, TECHNOLOGIES};
use crate::error::Result;
use crate::keys::surrogate_key;
use polars::prelude::*;

/// `dim_provincias`: exactly 24 rows, `PR01..PR24` in catalog order.
pub fn build_provinces() -> Result<DataFrame> {
    let ids: Vec<String> = (1..=PROVINCES.len())
        .map(|i| surrogate_key("PR", i))
        .collect();
    let density: Vec<f64> = PROVINCES
        .iter()
        .map(|p| round2(p.population as f64 / p.area_km2 as f64))
        .collect();

    Ok(DataFrame::new(vec![
        Column::new("provincia_id".into(), ids),
        Column::new(
            "provincia".into(),
            PROVINCES.iter().map(|p| p.name).collect::<Vec<_>>(),
        ),
        Column::new(
            "region".into(),
            PROVINCES.iter().map(|p| p.region).collect::<Vec<_>>(),
        ),
        Column::new(
            "poblacion_2023".into(),
            PROVINCES.iter().map(|p| p.population).collect::<Vec<_>>(),
        ),
        Column::new(
            "superficie_km2".into(),
            PROVINCES.iter().map(|p| p.area_km2).collect::<Vec<_>>(),
        ),
        Column::new(
            "capital".into(),
            PROVINCES.iter().map(|p| p.capital).collect::<Vec<_>>(),
        ),
        Column::new("densidad_poblacional".into(), density),
    ])?)
}

/// `dim_tecnologias`: `TEC1..` in catalog order.
pub fn build_technologies() -> Result<DataFrame> {
    let ids: Vec<String> = (1..=TECHNOLOGIES.len())
        .map(|i| surrogate_key("TEC", i))
        .collect();
    Ok(DataFrame::new(vec![
        Column::new("tecnologia_id".into(), ids),
        Column::new(
            "tecnologia".into(),
            TECHNOLOGIES.iter().map(|t| t.0).collect::<Vec<_>>(),
        ),
        Column::new(
            "categoria".into(),
            TECHNOLOGIES.iter().map(|t| t.1).collect::<Vec<_>>(),
        ),
        Column::new(
            "descripcion".into(),
            TECHNOLOGIES.iter().map(|t| t.2).collect::<Vec<_>>(),
        ),
    ])?)
}

/// `dim_velocidades` from `(name, min_kbps)` tiers. Each tier's max is the
/// next tier's min; the last tier gets the open-ended sentinel.
pub fn build_speed_tiers_from(tiers: &[(&str, i64)]) -> Result<DataFrame> {
    let ids: Vec<String> = (1..=tiers.len()).map(|i| surrogate_key("VEL", i)).collect();
    let maxes: Vec<i64> = tiers
        .iter()
        .enumerate()
        .map(|(i, _)| tiers.get(i + 1).map_or(OPEN_ENDED_MAX_KBPS, |next| next.1))
        .collect();
    Ok(DataFrame::new(vec![
        Column::new("velocidad_id".into(), ids),
        Column::new(
            "rango_velocidad".into(),
            tiers.iter().map(|t| t.0).collect::<Vec<_>>(),
        ),
        Column::new(
            "velocidad_min_kbps".into(),
            tiers.iter().map(|t| t.1).collect::<Vec<_>>(),
        ),
        Column::new("velocidad_max_kbps".into(), maxes),
    ])?)
}

/// `dim_velocidades` from the standard catalog.
pub fn build_speed_tiers() -> Result<DataFrame> {
    build_speed_tiers_from(SPEED_TIERS)
}

/// `dim_servicios`: `SRV1..` in catalog order.
pub fn build_services() -> Result<DataFrame> {
    let ids: Vec<String> = (1..=SERVICES.len())
        .map(|i| surrogate_key("SRV", i))
        .collect();
    Ok(DataFrame::new(vec![
        Column::new("servicio_id".into(), ids),
        Column::new(
            "servicio".into(),
            SERVICES.iter().map(|s| s.0).collect::<Vec<_>>(),
        ),
        Column::new(
            "categoria".into(),
            SERVICES.iter().map(|s| s.1).collect::<Vec<_>>(),
        ),
        Column::new(
            "descripcion".into(),
            SERVICES.iter().map(|s| s.2).collect::<Vec<_>>(),
        ),
    ])?)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
