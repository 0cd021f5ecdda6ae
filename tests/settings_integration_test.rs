//! Integration tests for the settings layer
//!
//! Verifies TOML persistence round trips and the resolution errors a bad
//! fleet description must surface.

use ssh_forwarder::settings::{
    EndpointSettings, ForwardKind, ForwardSettings, Settings,
};
use ssh_forwarder::utils::error::ForwardError;
use tempfile::tempdir;

fn fleet() -> Settings {
    Settings {
        endpoints: vec![
            EndpointSettings {
                name: "master".into(),
                host: "202.116.105.20".into(),
                port: 22,
                user: "ln".into(),
                private_key_path: "/home/ln/.ssh/id_ed25519".into(),
                jump_hosts: vec![],
                created_at: chrono::Utc::now(),
            },
            EndpointSettings {
                name: "gpu02".into(),
                host: "gpu02".into(),
                port: 22,
                user: "ln".into(),
                private_key_path: "/home/ln/.ssh/id_ed25519".into(),
                jump_hosts: vec!["master".into()],
                created_at: chrono::Utc::now(),
            },
        ],
        forwards: vec![
            ForwardSettings {
                kind: ForwardKind::Local,
                endpoint: "gpu02".into(),
                local_port: 8888,
                remote_port: Some(9443),
                local_host: "localhost".into(),
                remote_host: "localhost".into(),
            },
            ForwardSettings {
                kind: ForwardKind::Dynamic,
                endpoint: "master".into(),
                local_port: 1080,
                remote_port: None,
                local_host: "localhost".into(),
                remote_host: "localhost".into(),
            },
        ],
    }
}

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("forwarders.toml");

    fleet().save(&path).await.unwrap();
    let loaded = Settings::load(&path).await.unwrap();

    assert_eq!(loaded.endpoints.len(), 2);
    assert_eq!(loaded.endpoints[1].name, "gpu02");
    assert_eq!(loaded.endpoints[1].jump_hosts, vec!["master".to_string()]);
    assert_eq!(loaded.forwards.len(), 2);
    assert_eq!(loaded.forwards[0].kind, ForwardKind::Local);
    assert_eq!(loaded.forwards[1].remote_port, None);
}

#[tokio::test]
async fn test_load_missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let result = Settings::load(dir.path().join("absent.toml")).await;
    assert!(matches!(result, Err(ForwardError::IoError(_))));
}

#[tokio::test]
async fn test_load_rejects_malformed_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    tokio::fs::write(&path, "endpoints = \"not a table\"")
        .await
        .unwrap();

    let result = Settings::load(&path).await;
    assert!(matches!(result, Err(ForwardError::ConfigError(_))));
}

#[test]
fn test_resolve_rejects_unknown_jump_host() {
    use russh::keys::ssh_key::{private::Ed25519Keypair, LineEnding, PrivateKey};

    let mut settings = fleet();
    settings.endpoints.remove(0); // gpu02 now points at a missing "master"
    settings.forwards.clear();

    // Key loading runs first, so gpu02 needs a parseable key on disk.
    let dir = tempdir().unwrap();
    let key_path = dir.path().join("id_ed25519");
    let key = PrivateKey::from(Ed25519Keypair::from_seed(&[9u8; 32]));
    std::fs::write(&key_path, key.to_openssh(LineEnding::LF).unwrap().as_bytes()).unwrap();
    settings.endpoints[0].private_key_path = key_path;

    match settings.resolve() {
        Err(ForwardError::ConfigError(message)) => assert!(message.contains("master")),
        other => panic!("expected a jump-host resolution error, got {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn test_resolve_rejects_unknown_endpoint_reference() {
    let mut settings = fleet();
    settings.endpoints.clear();

    let result = settings.resolve();
    assert!(matches!(result, Err(ForwardError::ConfigError(_))));
}
