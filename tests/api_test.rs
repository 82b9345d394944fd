use node_agent::api::{ApiError, PowerRequest};
use node_agent::config::Config;
use node_agent::environment::{Environment, EnvironmentError, ProcessState};
use node_agent::lifecycle::NodeSystem;
use node_agent::mock::{Gate, MockServices};
use node_agent::power::PowerAction;
use node_agent::registry::RegistryError;
use node_agent::server::{Event, ServerConfig, ServerId};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn system(mocks: &MockServices) -> NodeSystem {
    NodeSystem::new(Arc::new(Config::default()), Arc::new(mocks.installer()))
}

fn mocks() -> MockServices {
    MockServices::new(ServerConfig::new(ServerId::new_v4()))
}

#[tokio::test]
async fn test_invalid_action_is_unprocessable() {
    let mocks = mocks();
    let system = system(&mocks);
    let server = mocks.server(Config::default());

    let err = system
        .handlers
        .post_power(&server, PowerRequest::new("explode"))
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::UnprocessableEntity(_)));
    assert_eq!(err.status_code(), 422);
    assert!(mocks.log.calls().is_empty());
}

#[tokio::test]
async fn test_suspended_start_is_bad_request() {
    let mocks = mocks();
    let system = system(&mocks);
    let server = mocks.server(Config::default());
    server.set_suspended(true);

    for action in ["start", "restart"] {
        let err = system
            .handlers
            .post_power(&server, PowerRequest::new(action))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    // Stopping a suspended server is still allowed.
    system
        .handlers
        .post_power(&server, PowerRequest::new("stop"))
        .await
        .unwrap()
        .await
        .unwrap();
    assert!(mocks.log.contains("environment.wait_for_stop"));
}

#[tokio::test]
async fn test_accepted_request_reports_status() {
    let mocks = mocks();
    let system = system(&mocks);
    let server = mocks.server(Config::default());
    let mut events = server.events().subscribe().unwrap();

    system
        .handlers
        .post_power(&server, PowerRequest::new("start"))
        .await
        .unwrap()
        .await
        .unwrap();

    loop {
        match events.recv().await.unwrap() {
            Event::StatusChanged(state) => {
                assert_eq!(state, ProcessState::Running);
                break;
            }
            Event::DaemonMessage(_) => continue,
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_background_failure_is_published() {
    let mocks = mocks();
    mocks
        .environment
        .expect_terminate()
        .return_err(EnvironmentError::Other("no such container".into()));
    let system = system(&mocks);
    let server = mocks.server(Config::default());
    let mut events = server.events().subscribe().unwrap();

    system
        .handlers
        .post_power(&server, PowerRequest::new("kill"))
        .await
        .unwrap()
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        Event::PowerActionFailed {
            action: "kill".into(),
            error: "environment error: no such container".into(),
        }
    );
}

#[tokio::test]
async fn test_lock_timeout_in_background_is_published() {
    let mocks = mocks();
    let gate = Gate::new();
    mocks.environment.expect_wait_for_stop().with_gate(&gate).return_ok();
    let system = system(&mocks);
    let server = mocks.server(Config::default());
    let mut events = server.events().subscribe().unwrap();

    let stopping = system
        .handlers
        .post_power(&server, PowerRequest::new("stop"))
        .await
        .unwrap();
    gate.entered().await;

    system
        .handlers
        .post_power(&server, PowerRequest::new("start").with_wait(0))
        .await
        .unwrap()
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        Event::PowerActionFailed { action, .. } => assert_eq!(action, "start"),
        other => panic!("unexpected event {other:?}"),
    }

    gate.open();
    stopping.await.unwrap();
}

#[tokio::test]
async fn test_reinstall_conflicts_with_running_power_action() {
    let mocks = mocks();
    let gate = Gate::new();
    mocks.environment.expect_wait_for_stop().with_gate(&gate).return_ok();
    let system = system(&mocks);
    let server = mocks.server(Config::default());

    let stopping = tokio::spawn({
        let server = server.clone();
        async move { server.handle_power_action(PowerAction::Stop, None).await }
    });
    gate.entered().await;

    let err = system.handlers.reinstall(&server).await.unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(err.status_code(), 409);

    gate.open();
    stopping.await.unwrap().unwrap();

    system.handlers.reinstall(&server).await.unwrap().await.unwrap();
    assert!(mocks.log.contains("installer.reinstall"));
}

#[tokio::test]
async fn test_power_rejected_while_installing() {
    let mocks = mocks();
    let gate = Gate::new();
    let system = NodeSystem::new(
        Arc::new(Config::default()),
        Arc::new(mocks.installer().with_gate(&gate)),
    );
    let server = mocks.server(Config::default());

    let installing = system.handlers.install(&server).await.unwrap();
    gate.entered().await;
    assert!(server.is_installing());

    let err = server
        .handle_power_action(PowerAction::Start, None)
        .await
        .unwrap_err();
    assert!(matches!(err, node_agent::power::PowerError::Installing));

    gate.open();
    installing.await.unwrap();
    assert!(!server.is_installing());
}

#[tokio::test]
async fn test_send_commands() {
    let mocks = mocks();
    let system = system(&mocks);
    let server = mocks.server(Config::default());

    let err = system
        .handlers
        .send_commands(&server, vec!["say hi".into()])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 502);

    mocks.environment.set_state(ProcessState::Running);
    mocks
        .environment
        .expect_send_command()
        .return_err(EnvironmentError::NotRunning);
    system
        .handlers
        .send_commands(&server, vec!["lost".into(), "say hi".into(), "list".into()])
        .await
        .unwrap();
    assert_eq!(mocks.environment.commands(), vec!["say hi", "list"]);
}

#[tokio::test]
async fn test_create_server_installs_then_starts() {
    let mut config = ServerConfig::new(ServerId::new_v4());
    config.start_on_completion = true;
    let mocks = MockServices::new(config);
    let system = system(&mocks);
    let server = mocks.server(Config::default());

    system.handlers.create_server(server.clone()).await.unwrap().await.unwrap();

    assert!(system.manager.get(server.id()).await.unwrap().is_some());
    assert!(mocks.log.called_before("installer.install", "environment.start"));
    assert_eq!(mocks.environment.state(), ProcessState::Running);

    let err = system.handlers.create_server(server).await.unwrap_err();
    assert!(matches!(err, ApiError::Registry(RegistryError::AlreadyRegistered(_))));
    assert_eq!(err.status_code(), 409);
}

#[tokio::test]
async fn test_create_server_without_start() {
    let mocks = mocks();
    let system = system(&mocks);
    let server = mocks.server(Config::default());

    system.handlers.create_server(server).await.unwrap().await.unwrap();

    assert!(mocks.log.contains("installer.install"));
    assert!(!mocks.log.contains("environment.start"));
}

#[tokio::test]
async fn test_delete_unknown_server() {
    let mocks = mocks();
    let system = system(&mocks);

    let err = system.handlers.delete_server(ServerId::new_v4()).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_delete_through_handlers() {
    let mocks = mocks();
    let system = system(&mocks);
    let server = mocks.server(Config::default());
    system.manager.add(server.clone()).await.unwrap();

    system.handlers.delete_server(server.id()).await.unwrap().await.unwrap();

    let err = system.handlers.server(server.id()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(id) if id == server.id()));
}

#[tokio::test]
async fn test_deny_tokens() {
    let mocks = mocks();
    let system = system(&mocks);
    let issued = SystemTime::now() - Duration::from_secs(5);

    system.handlers.deny_tokens(vec!["a".into(), "b".into()]);

    assert!(system.deny_list.is_denied("a", issued));
    assert!(system.deny_list.is_denied("b", issued));
    assert!(!system.deny_list.is_denied("c", issued));
}

#[tokio::test]
async fn test_shutdown() {
    let mocks = mocks();
    let system = system(&mocks);
    system.manager.add(mocks.server(Config::default())).await.unwrap();

    system.shutdown().await.unwrap();
}
