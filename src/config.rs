use figment::{Figment, providers::{Env, Format, Serialized, Yaml}};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOLERATION_KEY: &str = "padok.fr/namespace";

fn default_listen_addr() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_tls_cert_path() -> String {
    "/tmp/toleration-injector/serving-certs/tls.crt".to_string()
}

fn default_tls_key_path() -> String {
    "/tmp/toleration-injector/serving-certs/tls.key".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_webhook_path() -> String {
    "/inject-tolerations".to_string()
}

fn default_toleration_key() -> String {
    DEFAULT_TOLERATION_KEY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectorConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_tls_cert_path")]
    pub tls_cert_path: String,
    #[serde(default = "default_tls_key_path")]
    pub tls_key_path: String,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Key of the injected toleration; its value is always the pod's namespace.
    #[serde(default = "default_toleration_key")]
    pub toleration_key: String,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tls_cert_path: default_tls_cert_path(),
            tls_key_path: default_tls_key_path(),
            metrics_addr: default_metrics_addr(),
            log_level: default_log_level(),
            webhook_path: default_webhook_path(),
            toleration_key: default_toleration_key(),
        }
    }
}

impl InjectorConfig {
    /// Defaults, overlaid by the YAML file at `path` if it exists, overlaid by
    /// `INJECTOR_*` environment variables.
    pub fn load(path: &str) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(InjectorConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("INJECTOR_").split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = InjectorConfig::load("missing.yaml").map_err(|e| *e)?;
            assert_eq!(config.listen_addr, "0.0.0.0:8443");
            assert_eq!(config.webhook_path, "/inject-tolerations");
            assert_eq!(config.toleration_key, DEFAULT_TOLERATION_KEY);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                "toleration_key: example.com/tenant\nlisten_addr: 127.0.0.1:9443\n",
            )?;
            jail.set_env("INJECTOR_LISTEN_ADDR", "0.0.0.0:10443");

            let config = InjectorConfig::load("config.yaml").map_err(|e| *e)?;
            assert_eq!(config.toleration_key, "example.com/tenant");
            assert_eq!(config.listen_addr, "0.0.0.0:10443");
            assert_eq!(config.metrics_addr, "0.0.0.0:9090");
            Ok(())
        });
    }
}
