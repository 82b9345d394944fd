#![cfg(unix)]

use node_agent::config::{Config, SystemUser};
use node_agent::configfiles::{ConfigurationFile, ConfigurationParser, Replacement};
use node_agent::environment::{Environment, ProcessEnvironment, ProcessState};
use node_agent::filesystem::LocalFilesystem;
use node_agent::power::PowerAction;
use node_agent::remote::StaticRemote;
use node_agent::server::{Server, ServerConfig, ServerId, ServerServices};
use std::os::unix::fs::MetadataExt;
use std::sync::Arc;

struct Fixture {
    server: Server,
    environment: Arc<ProcessEnvironment>,
    root: std::path::PathBuf,
    _data: tempfile::TempDir,
}

/// A server wired to a real process and data directory, whose directory has
/// not been created yet.
fn fixture(config_files: Vec<ConfigurationFile>) -> Fixture {
    let data = tempfile::tempdir().unwrap();
    // Handing files to ourselves needs no privileges.
    let owner = tempfile::tempfile().unwrap().metadata().unwrap();
    let daemon = Arc::new(Config {
        data_directory: data.path().to_path_buf(),
        check_permissions_on_boot: true,
        user: SystemUser {
            uid: owner.uid(),
            gid: owner.gid(),
        },
        ..Config::default()
    });

    let mut definition = ServerConfig::new(ServerId::new_v4());
    definition.invocation = "sleep 30".into();
    definition.config_files = config_files;

    let root = daemon.server_root(&definition.uuid);
    let environment = Arc::new(ProcessEnvironment::new(definition.uuid.to_string(), root.clone(), None));
    let services = ServerServices {
        environment: environment.clone(),
        filesystem: Arc::new(LocalFilesystem::new(
            root.clone(),
            daemon.disk_check_interval(),
            daemon.user.uid,
            daemon.user.gid,
        )),
        remote: Arc::new(StaticRemote::new([definition.clone()])),
        config: daemon,
    };

    Fixture {
        server: Server::new(definition, services),
        environment,
        root,
        _data: data,
    }
}

#[tokio::test]
async fn test_first_boot_creates_data_directory() {
    let f = fixture(Vec::new());
    assert!(!f.root.exists());

    f.server.handle_power_action(PowerAction::Start, None).await.unwrap();

    assert!(f.root.is_dir());
    assert_eq!(f.environment.state(), ProcessState::Running);

    f.server.handle_power_action(PowerAction::Terminate, None).await.unwrap();
    assert_eq!(f.environment.state(), ProcessState::Offline);
}

#[tokio::test]
async fn test_broken_configuration_file_does_not_block_boot() {
    let f = fixture(vec![ConfigurationFile {
        file: "../outside.properties".into(),
        parser: ConfigurationParser::Properties,
        replace: vec![Replacement {
            matcher: "motd".into(),
            replace_with: "hello".into(),
        }],
    }]);

    f.server.handle_power_action(PowerAction::Start, None).await.unwrap();

    assert_eq!(f.environment.state(), ProcessState::Running);
    assert!(!f.root.parent().unwrap().join("outside.properties").exists());

    f.server.handle_power_action(PowerAction::Terminate, None).await.unwrap();
}
