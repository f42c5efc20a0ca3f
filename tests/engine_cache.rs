//! Engine config-cache semantics: written once after the first
//! successful provider fetch, read by later stages without refetching

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use ignition_rs::providers::file::FileProvider;
use ignition_rs::{stages, Config, Engine, Fetcher};

const TIMEOUT: Duration = Duration::from_secs(10);

const CONFIG: &str = r#"{
    "ignition": { "version": "2.2.0" },
    "storage": {
        "files": [{
            "path": "/foo/bar",
            "contents": { "source": "data:,cached%0A" }
        }]
    }
}"#;

async fn run_stage(root: &TempDir, seed: &PathBuf, cache: &PathBuf, stage: &str) {
    let stages = stages::registry();
    let provider = FileProvider::with_path(seed);
    let mut engine = Engine {
        root: root.path().to_path_buf(),
        config_cache: cache.clone(),
        provider: &provider,
        fetcher: Fetcher::new(TIMEOUT),
        stages: &stages,
    };
    engine.run(stage).await.unwrap();
}

#[tokio::test]
async fn test_fetch_stage_writes_cache() {
    let root = TempDir::new().unwrap();
    let seed = root.path().join("seed.json");
    let cache = root.path().join("run/cache.json");
    std::fs::write(&seed, CONFIG).unwrap();

    run_stage(&root, &seed, &cache, "fetch").await;

    let cached = std::fs::read(&cache).unwrap();
    let config = Config::parse(&cached).unwrap();
    assert_eq!(config.storage.files[0].path, "/foo/bar");
}

#[tokio::test]
async fn test_later_stages_use_cache_without_refetching() {
    let root = TempDir::new().unwrap();
    let seed = root.path().join("seed.json");
    let cache = root.path().join("run/cache.json");
    std::fs::write(&seed, CONFIG).unwrap();

    run_stage(&root, &seed, &cache, "fetch").await;

    // the provider's source disappearing no longer matters
    std::fs::remove_file(&seed).unwrap();
    run_stage(&root, &seed, &cache, "files").await;

    assert_eq!(
        std::fs::read(root.path().join("foo/bar")).unwrap(),
        b"cached\n"
    );
}

#[tokio::test]
async fn test_provider_without_config_yields_empty_run() {
    let root = TempDir::new().unwrap();
    let seed = root.path().join("absent.json");
    let cache = root.path().join("run/cache.json");

    run_stage(&root, &seed, &cache, "files").await;

    // an empty config was cached and nothing was materialized
    let config = Config::parse(&std::fs::read(&cache).unwrap()).unwrap();
    assert!(config.storage.files.is_empty());
    assert!(!root.path().join("etc/systemd/system").exists());
}
