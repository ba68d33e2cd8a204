// Mutates the process environment, so it lives in its own test binary.

use serde::Deserialize;
use shim_config::{PluginRegistry, load_config};
use shim_rt::{Accumulator, Input, Plugin, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    service_name: String,
    secret_token: String,
    secret_value: String,
}

struct Dummy;

#[async_trait::async_trait]
impl Input for Dummy {
    fn name(&self) -> &str {
        "test"
    }

    async fn gather(&mut self, _acc: &Accumulator) -> Result<()> {
        Ok(())
    }
}

#[test]
fn secrets_come_from_the_process_environment() {
    unsafe {
        std::env::set_var("SECRET_TOKEN", "xxxxxxxxxx");
        std::env::set_var("SECRET_VALUE", r#"test"\test"#);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plugin.conf");
    std::fs::write(
        &path,
        "[[inputs.test]]\n  service_name = \"awesome name\"\n  secret_token = \"${SECRET_TOKEN}\"\n  secret_value = \"$SECRET_VALUE\"\n",
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    let mut registry = PluginRegistry::new();
    registry.register("test", move |config: ServiceConfig| {
        *slot.lock().unwrap() = Some(config);
        Ok(Plugin::polling(Dummy))
    });

    load_config(&path, &registry).unwrap();

    let config = seen.lock().unwrap().take().unwrap();
    assert_eq!(config.service_name, "awesome name");
    assert_eq!(config.secret_token, "xxxxxxxxxx");
    assert_eq!(config.secret_value, r#"test"\test"#);
}
