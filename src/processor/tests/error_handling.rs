//! Error handling integration tests

use super::{test_config, write_clean_fixtures};
use crate::error::EtlError;
use crate::processor::{PipelineRunner, Stage};
use crate::schema::{read_csv_table, string_values};
use std::fs;
use tempfile::TempDir;

#[tokio::test]
async fn test_corrupt_workbook_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    fs::create_dir_all(&config.raw_dir).unwrap();
    fs::write(config.raw_dir.join("tv_accesos_provincias.xlsx"), "not a workbook").unwrap();

    let stats = PipelineRunner::new(config.clone())
        .unwrap()
        .run(Stage::All)
        .await
        .unwrap();

    let clean = stats.stage("clean").unwrap();
    assert_eq!(clean.failed.len(), 1);
    assert!(clean.failed[0].path.ends_with("tv_accesos_provincias.xlsx"));
    assert!(
        !config
            .processed_dir
            .join("tv_accesos_provincias_clean.csv")
            .exists()
    );
    // Later stages still ran
    assert_eq!(stats.stages.len(), 6);
    assert_eq!(stats.stage("dimensions").unwrap().generated.len(), 5);
}

#[tokio::test]
async fn test_dictionary_without_required_columns_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    fs::create_dir_all(&config.out_dir).unwrap();
    fs::write(
        config.out_dir.join("fact_unificado_long.csv"),
        "anio,dominio,valor\n2022,Internet,1.5\n",
    )
    .unwrap();

    let result = PipelineRunner::new(config.clone())
        .unwrap()
        .run(Stage::Dictionary)
        .await;

    match result {
        Err(e @ EtlError::MissingColumns { .. }) => {
            assert!(e.is_fatal());
            assert!(e.to_string().contains("subcategoria, variable, fuente_archivo"));
        }
        other => panic!("Expected MissingColumns, got {:?}", other.map(|s| s.stages.len())),
    }
    assert!(!config.out_dir.join("diccionario_metricas.csv").exists());
}

#[tokio::test]
async fn test_facts_before_dimensions_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    write_clean_fixtures(&config);

    let stats = PipelineRunner::new(config.clone())
        .unwrap()
        .run(Stage::Facts)
        .await
        .unwrap();

    let facts = stats.stage("facts").unwrap();
    assert!(facts.generated.is_empty());
    assert_eq!(facts.skipped.len(), 1);
    assert!(facts.skipped[0].reason.contains("dimension tables"));
}

#[tokio::test]
async fn test_unusable_wide_table_fails_alone() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    write_clean_fixtures(&config);
    // Only identifier and total columns: nothing to unpivot
    fs::write(
        config
            .processed_dir
            .join("internet_accesos_tecnologias_localidades_clean.csv"),
        "anio,trimestre,provincia,total\n2022,1,Salta,5\n",
    )
    .unwrap();

    let stats = PipelineRunner::new(config.clone())
        .unwrap()
        .run(Stage::All)
        .await
        .unwrap();

    let facts = stats.stage("facts").unwrap();
    assert_eq!(facts.failed.len(), 1);
    assert_eq!(facts.generated.len(), 4);
    assert!(
        !config
            .dimensional_dir
            .join("fact_internet_accesos_tecnologias_localidades.csv")
            .exists()
    );
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path()).with_valid_years(2024, 2013);
    match PipelineRunner::new(config) {
        Err(EtlError::Configuration { .. }) => {}
        other => panic!("Expected Configuration error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_empty_base_directory_runs_to_completion() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());

    let stats = PipelineRunner::new(config)
        .unwrap()
        .run(Stage::All)
        .await
        .unwrap();
    assert_eq!(stats.files_failed(), 0);
    assert!(stats.stage("unify").unwrap().generated.is_empty());
    assert!(!stats.stage("dictionary").unwrap().skipped.is_empty());
}

#[tokio::test]
async fn test_failed_source_removes_fact_table_from_earlier_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    write_clean_fixtures(&config);
    let runner = PipelineRunner::new(config.clone()).unwrap();
    let fact = config
        .dimensional_dir
        .join("fact_internet_accesos_tecnologias_provincias.csv");
    let curated = config.out_dir.join("fact_tecnologias_long.csv");

    runner.run(Stage::All).await.unwrap();
    assert!(fact.exists());
    assert!(curated.exists());

    fs::write(
        config
            .processed_dir
            .join("internet_accesos_tecnologias_provincias_clean.csv"),
        "anio,trimestre,provincia,total\n2022,1,Salta,5\n",
    )
    .unwrap();
    let stats = runner.run(Stage::All).await.unwrap();

    let facts = stats.stage("facts").unwrap();
    assert_eq!(facts.failed.len(), 1);
    assert_eq!(facts.generated.len(), 3);
    assert!(!fact.exists());
    assert_eq!(stats.stage("curate").unwrap().failed.len(), 1);
    assert!(!curated.exists());
}

#[tokio::test]
async fn test_dropped_table_is_unpublished_on_rerun() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    write_clean_fixtures(&config);
    let runner = PipelineRunner::new(config.clone()).unwrap();
    runner.run(Stage::All).await.unwrap();

    fs::remove_file(
        config
            .processed_dir
            .join("internet_accesos_velocidad_rangos_provincias_clean.csv"),
    )
    .unwrap();
    let stats = runner.run(Stage::All).await.unwrap();

    assert_eq!(stats.files_failed(), 0);
    assert_eq!(stats.stage("facts").unwrap().generated.len(), 3);
    assert!(
        !config
            .dimensional_dir
            .join("fact_internet_accesos_velocidad_rangos_provincias.csv")
            .exists()
    );
    assert!(!config.out_dir.join("fact_velocidad_rangos_long.csv").exists());
    assert!(config.out_dir.join("fact_tecnologias_long.csv").exists());

    // No cleaned tables left: unified outputs and the dictionary go too
    for entry in fs::read_dir(&config.processed_dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_file() {
            fs::remove_file(path).unwrap();
        }
    }
    let stats = runner.run(Stage::All).await.unwrap();
    assert!(stats.stage("facts").unwrap().generated.is_empty());
    assert!(
        fs::read_dir(&config.dimensional_dir)
            .unwrap()
            .all(|e| !e.unwrap().file_name().to_string_lossy().starts_with("fact_"))
    );
    assert!(!config.out_dir.join("fact_unificado_long.csv").exists());
    assert!(!config.out_dir.join("fact_unificado_long.parquet").exists());
    assert!(!config.out_dir.join("diccionario_metricas.csv").exists());
    assert!(!config.out_dir.join("fact_tecnologias_long.csv").exists());
}

#[tokio::test]
async fn test_changed_time_source_rekeys_facts() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    write_clean_fixtures(&config);
    let runner = PipelineRunner::new(config.clone()).unwrap();
    runner.run(Stage::All).await.unwrap();

    fs::write(
        config
            .processed_dir
            .join("internet_accesos_baf_provincias_clean.csv"),
        "anio,trimestre,provincia,banda_ancha_fija,dial_up,total\n\
         2023,3,Salta,120,1,121\n\
         2023,4,Salta,130,1,131\n",
    )
    .unwrap();
    let stats = runner.run(Stage::All).await.unwrap();
    assert_eq!(stats.files_failed(), 0);

    let time = read_csv_table(&config.dimensional_dir.join("dim_tiempo.csv"), true).unwrap();
    assert_eq!(
        string_values(&time, "periodo").unwrap(),
        vec![Some("2023T3".to_string()), Some("2023T4".to_string())]
    );

    let baf = read_csv_table(
        &config
            .dimensional_dir
            .join("fact_internet_accesos_baf_provincias.csv"),
        true,
    )
    .unwrap();
    assert_eq!(
        string_values(&baf, "tiempo_id").unwrap(),
        vec![Some("TM01".to_string()), Some("TM02".to_string())]
    );

    // 2022 rows no longer have a period in the rebuilt dimension
    let technologies = read_csv_table(
        &config
            .dimensional_dir
            .join("fact_internet_accesos_tecnologias_provincias.csv"),
        true,
    )
    .unwrap();
    assert!(
        string_values(&technologies, "tiempo_id")
            .unwrap()
            .iter()
            .all(Option::is_none)
    );
    assert!(
        stats
            .stage("facts")
            .unwrap()
            .warnings
            .iter()
            .any(|w| w.contains("fact_internet_accesos_tecnologias_provincias")
                && w.contains("tiempo_id"))
    );
}

#[tokio::test]
async fn test_failed_workbook_removes_clean_table_from_earlier_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    fs::create_dir_all(&config.raw_dir).unwrap();
    fs::create_dir_all(&config.processed_dir).unwrap();
    let stale = config.processed_dir.join("tv_accesos_provincias_clean.csv");
    let summary = config.processed_dir.join("resumen_datos.csv");
    fs::write(&stale, "anio,trimestre,provincia,accesos\n2022,1,Salta,5\n").unwrap();
    fs::write(&summary, "archivo,filas\ntv_accesos_provincias_clean.csv,1\n").unwrap();
    fs::write(config.raw_dir.join("tv_accesos_provincias.xlsx"), "not a workbook").unwrap();

    let stats = PipelineRunner::new(config.clone())
        .unwrap()
        .run(Stage::Clean)
        .await
        .unwrap();

    assert_eq!(stats.stage("clean").unwrap().failed.len(), 1);
    assert!(!stale.exists());
    assert!(!summary.exists());
}
