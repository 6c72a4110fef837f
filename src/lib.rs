//! ENACOM ETL Library
//!
//! Turns quarterly telecommunications-market spreadsheets (internet, mobile,
//! fixed telephony and TV statistics per province) into a star-schema
//! dimensional model and republishes curated extracts for analytics tools.
//!
//! This library provides tools for:
//! - Reading the first sheet of raw workbooks with header detection
//! - Building the time, province, technology, speed tier and service
//!   dimensions with stable surrogate keys
//! - Resolving inconsistently encoded raw values onto those keys
//! - Reshaping wide per-technology and per-speed-bucket tables into long
//!   fact tables
//! - Unifying every cleaned table into one long table and describing its
//!   metrics in a dictionary

pub mod cli;
pub mod config;
pub mod constants;
pub mod dictionary;
pub mod dimensions;
pub mod error;
pub mod keys;
pub mod models;
pub mod normalize;
pub mod processor;
pub mod report;
pub mod reshape;
pub mod resolver;
pub mod schema;
pub mod spreadsheet;
pub mod unify;

pub use config::{CompressionAlgorithm, PipelineConfig};
pub use dimensions::DimensionSet;
pub use error::{EtlError, Result};
pub use models::{Domain, FactKind, PipelineStats, Resolution, StageReport};
pub use processor::{PipelineRunner, Stage};
pub use resolver::KeyResolver;
