use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::{PartialBrokerSettings, PartialSettings, Settings, StorageBackend};
use super::{load_config, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 8085);
    assert_eq!(settings.broker.default_ack_deadline_secs, 10);
    assert_eq!(settings.broker.max_messages_per_pull, 1000);
    assert_eq!(settings.storage.backend, StorageBackend::Memory);
    assert!(settings.push.enabled);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_partial_settings_keep_unset_defaults() {
    let partial = PartialSettings {
        server: None,
        broker: Some(PartialBrokerSettings {
            default_ack_deadline_secs: Some(30),
            max_messages_per_pull: None,
        }),
        storage: None,
        push: None,
        log: None,
    };
    let settings = partial.merge(Settings::default());
    assert_eq!(settings.broker.default_ack_deadline_secs, 30);
    assert_eq!(settings.broker.max_messages_per_pull, 1000);
    assert_eq!(settings.server.port, 8085);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // Create a temporary directory and set it as current dir so load_config
    // will pick up config/default.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [storage]
        backend = "sled"
        path = "/var/lib/pullsub"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    // restore cwd before asserting so a failure does not leak into other tests
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.storage.backend, StorageBackend::Sled);
    assert_eq!(cfg.storage.path, "/var/lib/pullsub");
    assert_eq!(cfg.broker.default_ack_deadline_secs, 10);
}

#[test]
#[serial]
fn load_config_reads_environment_overrides() {
    temp_env::with_vars(
        [
            ("PULLSUB__SERVER__PORT", Some("7070")),
            ("PULLSUB__BROKER__DEFAULT_ACK_DEADLINE_SECS", Some("45")),
            ("PULLSUB__PUSH__ENABLED", Some("false")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.server.port, 7070);
            assert_eq!(cfg.broker.default_ack_deadline_secs, 45);
            assert!(!cfg.push.enabled);
        },
    );
}

#[test]
#[serial]
fn load_config_from_explicit_path() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("pullsub.toml");
    fs::write(
        &path,
        r#"
        [log]
        level = "debug"

        [push]
        timeout_secs = 3
        "#,
    )
    .expect("write config file");

    let cfg = load_config_from(&path).expect("load_config_from failed");
    assert_eq!(cfg.log.level, "debug");
    assert_eq!(cfg.push.timeout_secs, 3);
    assert_eq!(cfg.push.connect_timeout_secs, 8);
}

#[test]
#[serial]
fn load_config_from_missing_path_fails() {
    let tmp = TempDir::new().expect("create tempdir");
    assert!(load_config_from(tmp.path().join("absent.toml")).is_err());
}
