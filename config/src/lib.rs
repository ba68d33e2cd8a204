//! Loading a shimmed plugin from its configuration document
//!
//! The document is TOML with a single plugin section:
//!
//! ```toml
//! [[inputs.my_plugin]]
//!   service_name = "awesome name"
//!   secret_token = "${SECRET_TOKEN}"
//! ```
//!
//! Secret placeholders are resolved against the environment before the text
//! is decoded, the section is decoded into the plugin's own configuration
//! type and the plugin is built through a [`PluginRegistry`].

mod document;
mod loader;
mod registry;
mod secrets;

pub use document::PluginSection;
pub use loader::{load_config, load_config_str, load_config_with, read_section};
pub use registry::PluginRegistry;
pub use secrets::SecretResolver;
