// src/config/mod.rs
pub mod settings;
pub mod specialty;

pub use settings::Settings;
pub use specialty::{
    is_valid_slug, load_catalog_default, load_catalog_from, ConfigSource, SpecialtyCatalog,
    SpecialtyConfig,
};
