//! Data access: schema constants, CSV loading, pre-trained model registry

pub mod loader;
pub mod registry;
pub mod schema;

pub use loader::{CsvDataLoader, PooledSource, StationSource};
pub use registry::{ModelRegistry, MODEL_FAMILIES};
