//! Integration tests for the processor module
//!
//! Runs pipeline stages against cleaned-table fixtures written into a
//! temporary base directory.

pub mod error_handling;

use crate::config::PipelineConfig;
use std::fs;
use std::path::Path;

/// Cleaned tables covering every routing path the fixtures need
pub fn write_clean_fixtures(config: &PipelineConfig) {
    fs::create_dir_all(&config.processed_dir).unwrap();
    let tables = [
        (
            "internet_accesos_baf_provincias_clean.csv",
            "anio,trimestre,provincia,banda_ancha_fija,dial_up,total\n\
             2022,1,Salta,100,2,102\n\
             2022,1,Córdoba,300,,300\n\
             2022,2,Salta,110,1,111\n\
             2022,2,Capital Federal,500,5,505\n",
        ),
        (
            "internet_accesos_tecnologias_provincias_clean.csv",
            "anio,trimestre,provincia,adsl,cablemodem,fibra_óptica,wireless,otros,total\n\
             2022,1,Salta,10,20,30,4,1,65\n\
             2022,2,Neuquén,5,,40,2,0,47\n",
        ),
        (
            "internet_accesos_velocidad_rangos_provincias_clean.csv",
            "anio,trimestre,provincia,hasta_512_kbps,6_a_10_mbps,+_30_mbps,otros,total\n\
             2022,1,Jujuy,1,2,3,4,10\n",
        ),
        (
            "comunicaciones_moviles_accesos_clean.csv",
            "anio,trimestre,prepago,pospago\n2022,1,1000,200\n2022,2,1100,210\n",
        ),
        (
            "internet_penetracion_hogares_provincias_clean.csv",
            "anio,trimestre,provincia,accesos_por_cada_100_hogares\n\
             2022,1,Salta,55.2\n2022,2,Salta,\n",
        ),
    ];
    for (name, content) in tables {
        fs::write(config.processed_dir.join(name), content).unwrap();
    }
}

/// Base configuration rooted at `base`
pub fn test_config(base: &Path) -> PipelineConfig {
    PipelineConfig::from_base_dir(base)
}
