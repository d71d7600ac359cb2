// Core infrastructure modules
pub mod core;

// Feature-specific modules
pub mod config;
pub mod db;
pub mod logging;

pub use config::{load_config, BatchErrorPolicy, Config, DatabaseConfig, LogConfig};
pub use core::{BatchliteError, Result};
pub use db::{
    BatchOutcome, Database, GroupQuery, ListItem, Record, RecordGroup, StatementKind,
    StatementOutcome,
};
