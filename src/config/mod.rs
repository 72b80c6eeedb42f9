mod settings;

pub use settings::{
    Config, LoggingConfig, NonRelocatablePolicy, PackagingConfig, TreeConfig, UidStrategy,
    EXAMPLE_CONFIG,
};
