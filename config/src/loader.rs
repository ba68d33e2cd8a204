use crate::document::PluginSection;
use crate::registry::PluginRegistry;
use crate::secrets::SecretResolver;
use shim_error::{Result, ShimError};
use shim_rt::Plugin;
use std::path::Path;
use tracing::{debug, info};

/// Load the plugin described by the configuration file at `path`, resolving
/// secrets from the process environment.
pub fn load_config(path: impl AsRef<Path>, registry: &PluginRegistry) -> Result<Plugin> {
    load_config_with(path, registry, &SecretResolver::from_env())
}

pub fn load_config_with(
    path: impl AsRef<Path>,
    registry: &PluginRegistry,
    resolver: &SecretResolver,
) -> Result<Plugin> {
    let path = path.as_ref();
    info!("Loading plugin configuration from {}", path.display());

    let text = std::fs::read_to_string(path).map_err(|e| {
        ShimError::configuration(format!("cannot read '{}': {}", path.display(), e))
    })?;

    load_config_str(&text, registry, resolver)
}

/// Load a plugin from configuration text that is already in memory.
pub fn load_config_str(
    text: &str,
    registry: &PluginRegistry,
    resolver: &SecretResolver,
) -> Result<Plugin> {
    let section = read_section(text, resolver)?;
    let plugin = registry.instantiate(&section)?;

    info!("Configured plugin '{}'", section.name());
    Ok(plugin)
}

/// Resolve secrets in `text` and extract its plugin section.
pub fn read_section(text: &str, resolver: &SecretResolver) -> Result<PluginSection> {
    let resolved = resolver.resolve(text)?;
    let section = PluginSection::parse(&resolved)?;

    // Option values may carry secrets, only the keys are logged
    debug!(
        plugin = section.name(),
        options = ?section.options().keys().collect::<Vec<_>>(),
        "Read plugin section"
    );
    Ok(section)
}
