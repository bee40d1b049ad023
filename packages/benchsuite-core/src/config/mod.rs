//! Configuration resolution
//!
//! - `document`: canonical sectioned key/value document (JSON + INI decoders)
//! - `resolver`: name → document lookup over the alternative/default directories
//! - `settings`: controller directories and `BENCHSUITE_*` overrides

pub mod document;
pub mod resolver;
pub mod settings;

pub use document::{ConfigDocument, ConfigSection, DEFAULT_SECTION};
pub use resolver::{ConfigKind, ConfigResolver, ConfigSource, SourceOrigin};
pub use settings::ControllerSettings;
