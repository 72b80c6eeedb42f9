//! Utility modules

pub mod logging;
pub mod names;
pub mod paths;

pub use logging::init_logging;
pub use names::{is_identifier, validate_identifier, validate_logical_name, validate_version};
pub use paths::{config_path, data_dir, default_bundle_dir, default_install_root, init_data_dir};
