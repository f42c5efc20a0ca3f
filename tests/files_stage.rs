//! Integration tests for the files stage, driven through the engine
//! against a temporary root

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use ignition_rs::providers::file::FileProvider;
use ignition_rs::{stages, Engine, Fetcher};

const TIMEOUT: Duration = Duration::from_secs(10);

const CONFIG: &str = r#"{
    "ignition": { "version": "2.2.0" },
    "storage": {
        "directories": [
            { "path": "/opt/data", "mode": 448 }
        ],
        "files": [{
            "path": "/foo/bar",
            "mode": 420,
            "contents": { "source": "data:,example%20file%0A" }
        }],
        "links": [
            { "path": "/foo/link", "target": "/foo/bar" }
        ]
    },
    "systemd": {
        "units": [
            {
                "name": "contentless.service",
                "dropins": [
                    { "name": "debug.conf", "contents": "[Service]\nEnvironment=DEBUG=1\n" },
                    { "name": "skipped.conf", "contents": "" }
                ]
            },
            {
                "name": "example.service",
                "contents": "[Service]\nExecStart=/bin/true\n",
                "enable": true,
                "enabled": false
            },
            { "name": "masked.service", "mask": true }
        ]
    },
    "networkd": {
        "units": [
            { "name": "00-eth0.network", "contents": "[Match]\nName=eth0\n" }
        ]
    }
}"#;

struct Harness {
    root: TempDir,
    config_path: PathBuf,
    cache_path: PathBuf,
}

impl Harness {
    fn new(config: &str) -> Self {
        let root = TempDir::new().unwrap();
        let config_path = root.path().join("seed.json");
        let cache_path = root.path().join("cache.json");
        std::fs::write(&config_path, config).unwrap();
        Self {
            root,
            config_path,
            cache_path,
        }
    }

    async fn run(&self, stage: &str) {
        let stages = stages::registry();
        let provider = FileProvider::with_path(&self.config_path);
        let mut engine = Engine {
            root: self.root.path().to_path_buf(),
            config_cache: self.cache_path.clone(),
            provider: &provider,
            fetcher: Fetcher::new(TIMEOUT),
            stages: &stages,
        };
        engine.run(stage).await.unwrap();
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }
}

fn mode_of(path: &Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[tokio::test]
async fn test_files_stage_materializes_nodes() {
    let harness = Harness::new(CONFIG);
    harness.run("files").await;

    let file = harness.path("foo/bar");
    assert_eq!(std::fs::read(&file).unwrap(), b"example file\n");
    assert_eq!(mode_of(&file), 0o644);

    let dir = harness.path("opt/data");
    assert!(dir.is_dir());
    assert_eq!(mode_of(&dir), 0o700);

    let link = harness.path("foo/link");
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        PathBuf::from("/foo/bar")
    );
}

#[tokio::test]
async fn test_contentless_unit_writes_only_dropins() {
    let harness = Harness::new(CONFIG);
    harness.run("files").await;

    // unit file NOT written, non-empty dropin IS
    assert!(!harness
        .path("etc/systemd/system/contentless.service")
        .exists());
    let dropin = harness.path("etc/systemd/system/contentless.service.d/debug.conf");
    assert_eq!(
        std::fs::read_to_string(&dropin).unwrap(),
        "[Service]\nEnvironment=DEBUG=1\n"
    );
    assert!(!harness
        .path("etc/systemd/system/contentless.service.d/skipped.conf")
        .exists());
}

#[tokio::test]
async fn test_enabled_false_beats_deprecated_enable() {
    let harness = Harness::new(CONFIG);
    harness.run("files").await;

    let preset =
        std::fs::read_to_string(harness.path("etc/systemd/system-preset/20-ignition.preset"))
            .unwrap();
    assert!(preset.contains("disable example.service"));
    assert!(!preset.contains("enable example.service"));
}

#[tokio::test]
async fn test_mask_links_unit_to_dev_null() {
    let harness = Harness::new(CONFIG);
    harness.run("files").await;

    let masked = harness.path("etc/systemd/system/masked.service");
    assert_eq!(std::fs::read_link(&masked).unwrap(), Path::new("/dev/null"));
}

#[tokio::test]
async fn test_networkd_unit_written() {
    let harness = Harness::new(CONFIG);
    harness.run("files").await;

    let unit = harness.path("etc/systemd/network/00-eth0.network");
    assert_eq!(
        std::fs::read_to_string(&unit).unwrap(),
        "[Match]\nName=eth0\n"
    );
}

#[tokio::test]
async fn test_rerun_produces_identical_state() {
    let harness = Harness::new(CONFIG);
    harness.run("files").await;

    let file = harness.path("foo/bar");
    let preset_path = harness.path("etc/systemd/system-preset/20-ignition.preset");
    let first_contents = std::fs::read(&file).unwrap();
    let first_mode = mode_of(&file);
    let first_preset = std::fs::read_to_string(&preset_path).unwrap();

    harness.run("files").await;

    assert_eq!(std::fs::read(&file).unwrap(), first_contents);
    assert_eq!(mode_of(&file), first_mode);
    assert_eq!(std::fs::read_to_string(&preset_path).unwrap(), first_preset);
    assert_eq!(
        std::fs::read_link(harness.path("foo/link")).unwrap(),
        PathBuf::from("/foo/bar")
    );
}
