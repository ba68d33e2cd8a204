use crate::document::PluginSection;
use serde::de::DeserializeOwned;
use shim_error::{Result, ShimError};
use shim_rt::Plugin;
use std::collections::BTreeMap;

type Factory = Box<dyn Fn(&PluginSection) -> Result<Plugin> + Send + Sync>;

/// Maps plugin names, as they appear in `[[inputs.NAME]]`, to the code that
/// builds the plugin from its decoded options.
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, Factory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `name`. Its section is decoded into `C` before
    /// `build` is called. A later registration under the same name replaces
    /// the earlier one.
    pub fn register<C, F>(&mut self, name: impl Into<String>, build: F) -> &mut Self
    where
        C: DeserializeOwned,
        F: Fn(C) -> Result<Plugin> + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move |section| build(section.decode::<C>()?));
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the plugin the section names.
    pub fn instantiate(&self, section: &PluginSection) -> Result<Plugin> {
        let Some(factory) = self.factories.get(section.name()) else {
            let known: Vec<&str> = self.names().collect();
            return Err(ShimError::configuration(format!(
                "unknown plugin '{}', known plugins: [{}]",
                section.name(),
                known.join(", ")
            )));
        };

        factory(section)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use shim_rt::{Accumulator, Input};

    #[derive(Deserialize)]
    struct NoopConfig {
        label: String,
    }

    struct Noop(String);

    #[async_trait::async_trait]
    impl Input for Noop {
        fn name(&self) -> &str {
            &self.0
        }

        async fn gather(&mut self, _acc: &Accumulator) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register("noop", |c: NoopConfig| Ok(Plugin::polling(Noop(c.label))))
            .register("other", |_: toml::Table| {
                Err(ShimError::configuration("other is never buildable"))
            });
        registry
    }

    #[test]
    fn test_instantiate_known_plugin() {
        let registry = registry();
        let section = PluginSection::parse("[[inputs.noop]]\nlabel = \"mine\"\n").unwrap();

        let plugin = registry.instantiate(&section).unwrap();
        assert_eq!(plugin.name(), "mine");
        assert!(!plugin.is_service());
    }

    #[test]
    fn test_unknown_plugin_lists_known_names() {
        let registry = registry();
        let section = PluginSection::parse("[[inputs.mystery]]\n").unwrap();

        let err = registry.instantiate(&section).unwrap_err();
        assert!(matches!(err, ShimError::Configuration { .. }));
        assert!(
            err.to_string()
                .contains("unknown plugin 'mystery', known plugins: [noop, other]"),
            "{}",
            err
        );
    }

    #[test]
    fn test_factory_errors_are_returned() {
        let registry = registry();

        let section = PluginSection::parse("[[inputs.noop]]\n").unwrap();
        let err = registry.instantiate(&section).unwrap_err();
        assert!(err.to_string().contains("label"), "{}", err);

        let section = PluginSection::parse("[[inputs.other]]\n").unwrap();
        let err = registry.instantiate(&section).unwrap_err();
        assert!(err.to_string().contains("never buildable"));
    }

    #[test]
    fn test_names() {
        let registry = registry();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["noop", "other"]);
        assert!(registry.contains("noop"));
        assert!(!registry.contains("mystery"));
    }
}
