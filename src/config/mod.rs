pub mod loader;
pub mod schema;

pub use loader::{
    load, load_from_dir, load_from_path, load_from_str, sanitize_filename, save_to_dir,
    save_to_path, ConfigError,
};
pub use schema::{CollectionError, CollectionSummary, PatchCollection, PatchDefinition, PatchRule};
