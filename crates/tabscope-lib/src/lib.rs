//! Engine behind tabscope table views: schema inspection, row filtering,
//! sorting, paging, export and column profiling over a pluggable table
//! backend.

pub mod backend;
pub mod comm;
pub mod config;
pub mod error;
pub mod error_display;
pub mod explorer;
pub mod export;
pub mod features;
pub mod filter;
pub mod format;
pub mod profile;
pub mod reconcile;
pub mod scalar;
pub mod schema;
pub mod sort;
pub mod source;
pub mod state;
pub mod statistics;
pub mod view;
pub mod worker;

pub use backend::{BackendKind, PolarsBackend, RecordsBackend, TableBackend};
pub use config::{AppConfig, ConfigManager};
pub use error::{BackendError, BackendResult, ExplorerError, ExplorerResult};
pub use explorer::{DataExplorer, ExplorerConfig};
pub use scalar::{Scalar, TimeUnit};
pub use source::{load_dataframe, LoadOptions};
pub use tabscope_cli::{Args, FileFormat};

pub const APP_NAME: &str = "tabscope";
