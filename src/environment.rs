//! Environment variables handed to every deployed function

use anyhow::{Context, Result};
use gcloudkit::Provider;
use std::collections::BTreeSet;

use crate::config::Settings;
use crate::products::{Product, apis_to_activate};

/// Topic the postprocessor function listens on
pub const POSTPROCESSOR_TOPIC: &str = "report2bq-postprocessor";

/// Ordered `KEY=VALUE` pairs for `--set-env-vars`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionEnv {
    vars: Vec<(String, String)>,
}

impl FunctionEnv {
    /// Build the environment for this project
    ///
    /// `active_apis` is every API enabled in the project or being enabled by
    /// this run. A product whose API is not among them is switched off with
    /// `<PRODUCT>=False`.
    pub fn derive(settings: &Settings, api_key: &str, active_apis: &BTreeSet<String>) -> Self {
        let mut env = Self::default();
        env.set("DATASET", &settings.dataset);
        env.set("API_KEY", api_key);
        env.set("GCP_PROJECT", &settings.project);
        env.set("POSTPROCESSOR", POSTPROCESSOR_TOPIC);
        if let Some(admin) = &settings.administrator {
            env.set("ADMINISTRATOR_EMAIL", admin);
        }
        for product in Product::ALL {
            if !active_apis.contains(product.api()) {
                log::info!("{product} API is not active, disabling {product} in the functions");
                env.set(product.env_name(), "False");
            }
        }
        env
    }

    fn set(&mut self, key: &str, value: &str) {
        self.vars.push((key.to_string(), value.to_string()));
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value for `gcloud functions deploy --set-env-vars`
    ///
    /// Values containing a comma switch to gcloud's alternate delimiter
    /// syntax (`^|^K=V|K=V`).
    pub fn to_flag_value(&self) -> String {
        let needs_escape = self.vars.iter().any(|(_, v)| v.contains(','));
        let delimiter = if needs_escape { "|" } else { "," };
        let joined = self
            .vars
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(delimiter);
        if needs_escape {
            format!("^|^{joined}")
        } else {
            joined
        }
    }
}

/// APIs that will be active once this run's services are enabled
pub fn active_apis(
    provider: &dyn Provider,
    settings: &Settings,
    activating: bool,
) -> Result<BTreeSet<String>> {
    let mut active: BTreeSet<String> = provider
        .enabled_services()
        .context("Could not list enabled APIs")?
        .into_iter()
        .collect();
    if activating {
        active.extend(
            apis_to_activate(&settings.disabled_products)
                .into_iter()
                .map(str::to_string),
        );
    }
    Ok(active)
}

/// The API key from `--api-key`, else from the tokens bucket
pub fn resolve_api_key(provider: &dyn Provider, settings: &Settings) -> Result<Option<String>> {
    if let Some(key) = &settings.api_key {
        return Ok(Some(key.clone()));
    }
    let url = format!("gs://{}/api.key", settings.tokens_bucket());
    log::debug!("Reading API key from {url}");
    let stored = provider
        .read_object(&url)
        .with_context(|| format!("Could not read {url}"))?;
    Ok(stored
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::config::FileConfig;
    use clap::Parser;
    use gcloudkit::{MemoryProvider, ResourceDeclaration};

    fn settings(args: &[&str]) -> Settings {
        let mut all = vec!["report2bq-install", "--project=acme-data"];
        all.extend_from_slice(args);
        Settings::resolve(&Cli::try_parse_from(all).unwrap(), FileConfig::default()).unwrap()
    }

    fn all_product_apis() -> BTreeSet<String> {
        Product::ALL.iter().map(|p| p.api().to_string()).collect()
    }

    #[test]
    fn test_base_variables() {
        let env = FunctionEnv::derive(
            &settings(&["--administrator=ops@acme.example"]),
            "k3y",
            &all_product_apis(),
        );
        assert_eq!(
            env.to_flag_value(),
            "DATASET=report2bq,API_KEY=k3y,GCP_PROJECT=acme-data,\
             POSTPROCESSOR=report2bq-postprocessor,ADMINISTRATOR_EMAIL=ops@acme.example"
        );
    }

    #[test]
    fn test_ga360_false_when_api_inactive() {
        let mut active = all_product_apis();
        active.remove("analyticsreporting.googleapis.com");
        let env = FunctionEnv::derive(&settings(&["--no-ga360"]), "k3y", &active);
        assert_eq!(env.get("GA360"), Some("False"));
        assert!(env.get("SA360").is_none());
    }

    #[test]
    fn test_ga360_omitted_when_api_active() {
        let env = FunctionEnv::derive(&settings(&["--no-ga360"]), "k3y", &all_product_apis());
        assert!(env.get("GA360").is_none());
        assert!(!env.to_flag_value().contains("GA360"));
    }

    #[test]
    fn test_activation_counts_as_active() {
        let provider = MemoryProvider::new("acme-data");
        let s = settings(&["--no-ga360"]);

        let now = active_apis(&provider, &s, false).unwrap();
        assert!(now.is_empty());

        let after = active_apis(&provider, &s, true).unwrap();
        assert!(after.contains("dfareporting.googleapis.com"));
        assert!(!after.contains("analyticsreporting.googleapis.com"));

        let env = FunctionEnv::derive(&s, "k3y", &after);
        assert_eq!(env.get("GA360"), Some("False"));
        assert!(env.get("CM").is_none());
    }

    #[test]
    fn test_comma_in_value_uses_alternate_delimiter() {
        let env = FunctionEnv::derive(&settings(&[]), "a,b", &all_product_apis());
        let flag = env.to_flag_value();
        assert!(flag.starts_with("^|^DATASET=report2bq|API_KEY=a,b|"));
    }

    #[test]
    fn test_api_key_resolution() {
        let provider = MemoryProvider::new("acme-data");
        assert_eq!(resolve_api_key(&provider, &settings(&[])).unwrap(), None);

        provider.insert(
            &ResourceDeclaration::object("gs://acme-data-report2bq-tokens/api.key")
                .with("content", "stored-key\n"),
        );
        assert_eq!(
            resolve_api_key(&provider, &settings(&[])).unwrap().as_deref(),
            Some("stored-key")
        );
        assert_eq!(
            resolve_api_key(&provider, &settings(&["--api-key=flag-key"]))
                .unwrap()
                .as_deref(),
            Some("flag-key")
        );
    }
}
