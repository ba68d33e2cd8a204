use serde::de::DeserializeOwned;
use shim_error::{Result, ShimError};
use toml::{Table, Value};

/// The one plugin section of a configuration document: the plugin's name and
/// its raw options
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSection {
    name: String,
    options: Table,
}

impl PluginSection {
    /// Decode a document that holds exactly one `[[inputs.NAME]]` (or
    /// `[inputs.NAME]`) section.
    pub fn parse(text: &str) -> Result<Self> {
        let mut document: Table = text.parse().map_err(|e: toml::de::Error| {
            ShimError::configuration(format!("invalid configuration document: {}", e))
        })?;

        let inputs = match document.remove("inputs") {
            Some(Value::Table(inputs)) => inputs,
            Some(_) => {
                return Err(ShimError::configuration(
                    "'inputs' must be a table of plugins",
                ));
            }
            None => {
                return Err(ShimError::configuration(
                    "no plugin section found, expected [[inputs.<name>]]",
                ));
            }
        };

        if let Some(key) = document.keys().next() {
            return Err(ShimError::configuration(format!(
                "unexpected top-level entry '{}', only [[inputs.<name>]] is allowed",
                key
            )));
        }

        if inputs.len() != 1 {
            let names: Vec<&str> = inputs.keys().map(String::as_str).collect();
            return Err(ShimError::configuration(format!(
                "expected exactly one plugin section, found {} ({})",
                names.len(),
                names.join(", ")
            )));
        }

        let (name, value) = inputs
            .into_iter()
            .next()
            .ok_or_else(|| ShimError::configuration("no plugin section found"))?;

        let options = match value {
            Value::Table(options) => options,
            Value::Array(mut sections) if sections.len() == 1 => match sections.pop() {
                Some(Value::Table(options)) => options,
                _ => {
                    return Err(ShimError::configuration(format!(
                        "section 'inputs.{}' must be a table",
                        name
                    )));
                }
            },
            Value::Array(sections) => {
                return Err(ShimError::configuration(format!(
                    "section 'inputs.{}' must appear exactly once, found {}",
                    name,
                    sections.len()
                )));
            }
            _ => {
                return Err(ShimError::configuration(format!(
                    "section 'inputs.{}' must be a table",
                    name
                )));
            }
        };

        Ok(Self { name, options })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &Table {
        &self.options
    }

    /// Decode the options into the plugin's configuration type.
    pub fn decode<C: DeserializeOwned>(&self) -> Result<C> {
        Value::Table(self.options.clone())
            .try_into()
            .map_err(|e: toml::de::Error| {
                ShimError::configuration(format!(
                    "invalid options in section 'inputs.{}': {}",
                    self.name,
                    e.message()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Options {
        service_name: String,
        #[serde(default)]
        retries: u32,
    }

    #[test]
    fn test_array_and_table_forms() {
        let a = PluginSection::parse("[[inputs.demo]]\nservice_name = \"x\"\n").unwrap();
        let b = PluginSection::parse("[inputs.demo]\nservice_name = \"x\"\n").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.name(), "demo");
        assert_eq!(
            a.decode::<Options>().unwrap(),
            Options {
                service_name: "x".to_string(),
                retries: 0
            }
        );
    }

    #[test]
    fn test_exactly_one_section() {
        let err = PluginSection::parse("").unwrap_err();
        assert!(err.to_string().contains("no plugin section"));

        let err = PluginSection::parse("[inputs]\n").unwrap_err();
        assert!(err.to_string().contains("found 0"), "{}", err);

        let err = PluginSection::parse("[[inputs.a]]\n[[inputs.b]]\n").unwrap_err();
        assert!(err.to_string().contains("found 2 (a, b)"), "{}", err);

        let err = PluginSection::parse("[[inputs.a]]\n[[inputs.a]]\n").unwrap_err();
        assert!(err.to_string().contains("exactly once"), "{}", err);

        let err = PluginSection::parse("[[outputs.file]]\n[[inputs.a]]\n").unwrap_err();
        assert!(err.to_string().contains("'outputs'"), "{}", err);
    }

    #[test]
    fn test_decode_errors_name_the_field() {
        let section = PluginSection::parse("[[inputs.demo]]\nretries = 3\n").unwrap();
        let err = section.decode::<Options>().unwrap_err();
        assert!(matches!(err, ShimError::Configuration { .. }));
        assert!(err.to_string().contains("service_name"), "{}", err);

        let section =
            PluginSection::parse("[[inputs.demo]]\nservice_name = \"x\"\nbogus = 1\n").unwrap();
        let err = section.decode::<Options>().unwrap_err();
        assert!(err.to_string().contains("bogus"), "{}", err);
    }

    #[test]
    fn test_malformed_document() {
        let err = PluginSection::parse("[[inputs.demo]\nx = ").unwrap_err();
        assert!(matches!(err, ShimError::Configuration { .. }));
    }
}
