use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use vest_detect::{Comparison, LoadStrategy, TensorLayout, VestConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VEST_CONFIG",
        "VEST_ASSETS_DIR",
        "VEST_MODEL_STRATEGY",
        "VEST_CACHE_DIR",
        "VEST_WORKERS",
        "VEST_REQUEST_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let cache_dir = file.path().with_extension("cache");
    let json = format!(
        r#"{{
            "model": {{
                "assets_dir": "/opt/app/assets",
                "model_file": "vest_model_v2.onnx",
                "labels_file": "vest_labels.txt",
                "strategy": "buffered",
                "cache_dir": "{}"
            }},
            "preprocess": {{
                "input_size": 256,
                "mean": 128.0,
                "std": 128.0,
                "layout": "nchw",
                "resize_filter": "catmull_rom"
            }},
            "decision": {{
                "positive_index": 0,
                "comparison": "strict"
            }},
            "workers": 3,
            "request_timeout_ms": 1500
        }}"#,
        cache_dir.display()
    );
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VEST_CONFIG", file.path());
    std::env::set_var("VEST_MODEL_STRATEGY", "cached_copy");
    std::env::set_var("VEST_WORKERS", "6");

    let cfg = VestConfig::load().expect("load config");

    assert_eq!(cfg.model.assets_dir.to_str(), Some("/opt/app/assets"));
    assert_eq!(cfg.model.model_file, "vest_model_v2.onnx");
    assert_eq!(cfg.model.labels_file, "vest_labels.txt");
    assert_eq!(cfg.model.strategy, LoadStrategy::CachedCopy);
    assert_eq!(cfg.model.cache_dir.unwrap(), cache_dir);
    assert_eq!(cfg.preprocess.input_size, 256);
    assert_eq!(cfg.preprocess.mean, 128.0);
    assert_eq!(cfg.preprocess.layout, TensorLayout::Nchw);
    assert_eq!(cfg.decision.positive_index, 0);
    assert_eq!(cfg.decision.comparison, Comparison::Strict);
    assert_eq!(cfg.workers, 6);
    assert_eq!(cfg.request_timeout, Duration::from_millis(1500));

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = VestConfig::load().expect("load defaults");
    assert_eq!(cfg.model.model_file, "vest_model.onnx");
    assert_eq!(cfg.model.labels_file, "labels.txt");
    assert_eq!(cfg.model.strategy, LoadStrategy::Mapped);
    assert_eq!(cfg.preprocess.input_size, 224);
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEST_MODEL_STRATEGY", "teleport");
    assert!(VestConfig::load().is_err());
    clear_env();

    std::env::set_var("VEST_WORKERS", "0");
    assert!(VestConfig::load().is_err());
    clear_env();

    std::env::set_var("VEST_REQUEST_TIMEOUT_MS", "soon");
    assert!(VestConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "preprocess": { "std": 0.0 } }"#)
        .expect("write config");
    assert!(VestConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"not json").expect("write config");
    assert!(VestConfig::load_from(Some(file.path())).is_err());
}
