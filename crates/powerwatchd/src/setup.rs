//! Config → store, classifier, and engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use powerwatch_core::{PowerwatchConfig, StoreBackend, StoreConfig};
use powerwatch_engine::{Classifier, DecisionTree, EnginePolicy, FeaturePolicy, ShutoffEngine};
use powerwatch_state::{Layout, RedbStore, RestStore, SharedStore};

/// Relative paths in the config are taken from the config file's directory.
fn resolve(config_path: &Path, path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Open the configured backend.
pub fn open_store(config: &StoreConfig, config_path: &Path) -> anyhow::Result<Arc<dyn SharedStore>> {
    match config.backend {
        StoreBackend::Redb => {
            let path = config
                .path
                .as_deref()
                .context("redb backend needs store.path")?;
            let path = resolve(config_path, path);
            let path = path.as_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let store = RedbStore::open(path)?;
            info!(path = ?path, "redb store opened");
            Ok(Arc::new(store))
        }
        StoreBackend::Rest => {
            let mut store = RestStore::new(config.rest_address()?);
            if let Some(token) = &config.auth_token {
                store = store.with_auth_token(token.clone());
            }
            info!(
                address = store.address(),
                authenticated = config.auth_token.is_some(),
                "rest store configured"
            );
            Ok(Arc::new(store))
        }
    }
}

pub fn layout(config: &StoreConfig) -> Layout {
    Layout::new(&config.appliance_root, &config.dwell_root)
}

/// Engine tunables from the `[engine]` and `[features]` sections.
pub fn engine_policy(config: &PowerwatchConfig) -> anyhow::Result<EnginePolicy> {
    let (office_start, office_end) = config.features.office_window()?;
    Ok(EnginePolicy {
        threshold: config.engine.threshold()?,
        call_timeout: config.engine.call_timeout()?,
        features: FeaturePolicy {
            schema: config.features.schema,
            dwell_minutes: config.features.dwell_minutes,
            load_after_window: config.features.load_after_window,
            office_start,
            office_end,
        },
    })
}

/// Load the classifier model.
pub fn load_model(config: &PowerwatchConfig, config_path: &Path) -> anyhow::Result<DecisionTree> {
    let path = resolve(config_path, &config.classifier.model);
    let tree = DecisionTree::from_file(&path)
        .with_context(|| format!("loading model {}", path.display()))?;
    info!(
        path = %path.display(),
        features = tree.feature_count(),
        depth = tree.depth(),
        "classifier model loaded"
    );
    Ok(tree)
}

/// Everything needed to run cycles: store, model, and a schema-checked engine.
pub fn build_engine(config: &PowerwatchConfig, config_path: &Path) -> anyhow::Result<ShutoffEngine> {
    let store = open_store(&config.store, config_path)?;
    let model = load_model(config, config_path)?;
    let policy = engine_policy(config)?;
    let engine = ShutoffEngine::new(store, Arc::new(model), layout(&config.store), policy)?;
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerwatch_core::FeatureSchema;
    use serde_json::json;
    use std::time::Duration;

    const MODEL: &str = r#"{ "feature_count": 3, "root": { "label": 0 } }"#;

    fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
        std::fs::write(dir.join("model.json"), MODEL).unwrap();
        let path = dir.join("powerwatch.toml");
        let body = format!(
            "[store]\nbackend = \"redb\"\npath = \"{}\"\n{extra}",
            dir.join("state/powerwatch.redb").display()
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn demo_configs_load() {
        let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/single-home");
        for name in ["powerwatch.toml", "rest.toml"] {
            let config_path = demo.join(name);
            let config = PowerwatchConfig::from_file(&config_path).unwrap();
            let model = load_model(&config, &config_path).unwrap();
            powerwatch_engine::ensure_schema(&model, config.features.schema).unwrap();
            engine_policy(&config).unwrap();
        }
    }

    #[test]
    fn relative_paths_follow_config_file() {
        let config_path = Path::new("/etc/powerwatch/powerwatch.toml");
        assert_eq!(
            resolve(config_path, Path::new("model.json")),
            PathBuf::from("/etc/powerwatch/model.json")
        );
        assert_eq!(
            resolve(config_path, Path::new("/var/lib/pw.redb")),
            PathBuf::from("/var/lib/pw.redb")
        );
        assert_eq!(resolve(Path::new("powerwatch.toml"), Path::new("m.json")), PathBuf::from("m.json"));
    }

    #[test]
    fn policy_from_config() {
        let config = PowerwatchConfig::parse(
            "[engine]\nthreshold = \"5m\"\ncall_timeout = \"500ms\"\n\
             [features]\nschema = \"full\"\noffice_start = \"08:30\"\n",
        )
        .unwrap();
        let policy = engine_policy(&config).unwrap();
        assert_eq!(policy.threshold, Duration::from_secs(300));
        assert_eq!(policy.call_timeout, Duration::from_millis(500));
        assert_eq!(policy.features.schema, FeatureSchema::Full);
        assert_eq!(policy.features.office_start.to_string(), "08:30:00");
    }

    #[test]
    fn rest_address_accepts_scheme() {
        let config = PowerwatchConfig::parse(
            "[store]\nbackend = \"rest\"\naddress = \"http://127.0.0.1:9000/\"\n",
        )
        .unwrap();
        assert!(open_store(&config.store, Path::new("powerwatch.toml")).is_ok());
    }

    #[test]
    fn https_store_is_rejected_with_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("powerwatch.toml");
        std::fs::write(
            &config_path,
            "[store]\nbackend = \"rest\"\naddress = \"https://home-1234.firebaseio.com\"\n",
        )
        .unwrap();

        let err = PowerwatchConfig::from_file(&config_path).unwrap_err();
        assert!(matches!(err, powerwatch_core::ConfigError::UnsupportedScheme(_)));
    }

    #[tokio::test]
    async fn build_engine_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), "");
        let config = PowerwatchConfig::from_file(&config_path).unwrap();

        let engine = build_engine(&config, &config_path).unwrap();
        let report = engine.run_cycle(chrono::Utc::now()).await.unwrap();
        assert!(report.appliances.is_empty());
        assert!(dir.path().join("state/powerwatch.redb").exists());
    }

    #[test]
    fn build_engine_rejects_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), "[features]\nschema = \"time_of_day\"\n");
        let config = PowerwatchConfig::from_file(&config_path).unwrap();

        let err = build_engine(&config, &config_path).err().unwrap();
        assert!(err.to_string().contains("time_of_day"));
    }

    #[test]
    fn missing_model_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), "[classifier]\nmodel = \"nope.json\"\n");
        let config = PowerwatchConfig::from_file(&config_path).unwrap();

        let err = load_model(&config, &config_path).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }

    #[tokio::test]
    async fn layout_roots_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), "appliance_root = \"home/plugs\"\n");
        let config = PowerwatchConfig::from_file(&config_path).unwrap();
        assert_eq!(layout(&config.store).appliance_path("B1"), "home/plugs/B1");

        let store = open_store(&config.store, &config_path).unwrap();
        store.set("home/plugs/B1", json!("1")).await.unwrap();
        drop(store);

        let engine = build_engine(&config, &config_path).unwrap();
        let report = engine.run_cycle(chrono::Utc::now()).await.unwrap();
        assert_eq!(report.appliances.len(), 1);
    }
}
