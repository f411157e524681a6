//! Built-in configuration sources.
//!
//! Every source implements [`strata_core::ConfigSource`]: loading is
//! total (failures surface as an empty mapping plus metadata), roots
//! must be mappings, and file sources attempt to parse even when the
//! extension looks wrong.

mod environment;
mod ini;
mod json;
mod memory;
mod remote;
mod secrets;
mod text;
mod toml;
mod yaml;

pub use environment::EnvironmentSource;
pub use ini::IniSource;
pub use json::JsonSource;
pub use memory::MemorySource;
pub use remote::RemoteSource;
pub use secrets::SecretBackedSource;
pub use toml::TomlSource;
pub use yaml::YamlSource;
