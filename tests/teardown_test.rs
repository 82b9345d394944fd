use node_agent::config::Config;
use node_agent::environment::EnvironmentError;
use node_agent::lifecycle::NodeSystem;
use node_agent::mock::{Gate, MockServices};
use node_agent::server::{Server, ServerConfig, ServerId};
use node_agent::teardown::TeardownError;
use std::sync::Arc;

struct Fixture {
    system: NodeSystem,
    mocks: MockServices,
    server: Server,
    root: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("server.properties"), "motd=hello\n").unwrap();

    let mocks = MockServices::with_root(ServerConfig::new(ServerId::new_v4()), root.path());
    let system = NodeSystem::new(Arc::new(Config::default()), Arc::new(mocks.installer()));
    let server = mocks.server(Config::default());
    system.manager.add(server.clone()).await.unwrap();

    Fixture {
        system,
        mocks,
        server,
        root,
    }
}

#[tokio::test]
async fn test_delete_cascade() {
    let f = fixture().await;
    let mut events = f.server.events().subscribe().unwrap();
    let session = f.server.sessions().push();
    let context = f.server.context();
    let download = f.system.downloads.register(f.server.id(), "https://example.com/plugin.jar");
    let unrelated = f.system.downloads.register(ServerId::new_v4(), "https://example.com/other.jar");

    let cleanup = f.system.teardown.delete(&f.server).await.unwrap();

    // Unreachable as soon as delete returns, before cleanup is awaited.
    assert!(f.system.manager.get(f.server.id()).await.unwrap().is_none());

    assert!(f.server.is_suspended());
    assert!(context.is_cancelled());
    assert!(session.token.is_cancelled());
    assert!(f.server.sessions().is_empty());
    assert!(f.server.events().is_destroyed());
    assert!(events.recv().await.is_err());
    assert!(download.token().is_cancelled());
    assert!(!unrelated.token().is_cancelled());
    assert_eq!(f.system.downloads.len(), 1);
    assert!(f.mocks.log.contains("environment.destroy"));

    cleanup.await.unwrap();
    assert!(!f.root.path().exists());
}

#[tokio::test]
async fn test_destroy_failure_keeps_server() {
    let f = fixture().await;
    f.mocks
        .environment
        .expect_destroy()
        .return_err(EnvironmentError::Other("container busy".into()));

    let err = f.system.teardown.delete(&f.server).await.unwrap_err();

    assert!(matches!(err, TeardownError::Destroy(_)));
    assert!(f.system.manager.get(f.server.id()).await.unwrap().is_some());
    assert!(f.root.path().join("server.properties").exists());
    // Steps before destroy have already happened.
    assert!(f.server.is_suspended());
    assert!(f.server.events().is_destroyed());
}

#[tokio::test]
async fn test_deregistered_while_destroy_is_not_yet_done() {
    let f = fixture().await;
    let gate = Gate::new();
    f.mocks.environment.expect_destroy().with_gate(&gate).return_ok();

    let deleting = tokio::spawn({
        let teardown = f.system.teardown.clone();
        let server = f.server.clone();
        async move { teardown.delete(&server).await }
    });
    gate.entered().await;

    // Destroy is the gate for deregistration.
    assert!(f.system.manager.get(f.server.id()).await.unwrap().is_some());

    gate.open();
    let cleanup = deleting.await.unwrap().unwrap();
    assert!(f.system.manager.get(f.server.id()).await.unwrap().is_none());
    cleanup.await.unwrap();
}

#[tokio::test]
async fn test_delete_leaves_other_servers_registered() {
    let f = fixture().await;
    let other = MockServices::new(ServerConfig::new(ServerId::new_v4()));
    let other_server = other.server(Config::default());
    f.system.manager.add(other_server.clone()).await.unwrap();

    f.system.teardown.delete(&f.server).await.unwrap().await.unwrap();

    let remaining = f.system.manager.all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id(), other_server.id());
}

#[tokio::test]
async fn test_start_after_delete_is_rejected() {
    let f = fixture().await;
    f.system.teardown.delete(&f.server).await.unwrap().await.unwrap();

    let request = node_agent::api::PowerRequest::new("start");
    let err = f.system.handlers.post_power(&f.server, request).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}
