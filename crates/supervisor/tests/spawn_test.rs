use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agentbox_supervisor::{Error, ProcessSupervisor, Supervisor, SupervisorOptions};
use agentbox_topology::{JoinTopology, Node, Role};
use tempfile::TempDir;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn options(binary: PathBuf) -> SupervisorOptions {
    SupervisorOptions {
        binary,
        log_output: true,
        pid_poll: Duration::from_millis(10),
        server_settle: Duration::ZERO,
        stop_poll: Duration::from_millis(50),
        ..SupervisorOptions::default()
    }
}

fn client(dir: &Path) -> Node {
    Node::new(
        Role::Client,
        "boxc0",
        "10.10.10.4".parse().unwrap(),
        "boxeth3",
        dir.join("boxc0"),
    )
}

fn join() -> JoinTopology {
    JoinTopology {
        servers: vec!["10.10.10.1".parse().unwrap()],
    }
}

#[tokio::test]
async fn test_start_and_stop_agent() {
    let dir = TempDir::new().unwrap();
    let binary = script(dir.path(), "agent", "echo ready\nexec sleep 30");
    let supervisor = ProcessSupervisor::new(options(binary));

    let pid = supervisor.start(&client(dir.path()), &join()).await.unwrap();
    assert!(pid > 0);
    assert!(supervisor.is_alive(pid));

    tokio::time::timeout(Duration::from_secs(10), supervisor.stop(pid))
        .await
        .unwrap()
        .unwrap();
    assert!(!supervisor.is_alive(pid));

    tokio::time::timeout(Duration::from_secs(10), supervisor.finish())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stop_escalates_after_timeout() {
    let dir = TempDir::new().unwrap();
    let binary = script(dir.path(), "stubborn", "trap '' INT\nexec sleep 30");
    let supervisor = ProcessSupervisor::new(SupervisorOptions {
        stop_timeout: Some(Duration::from_millis(200)),
        ..options(binary)
    });

    let pid = supervisor.start(&client(dir.path()), &join()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), supervisor.stop(pid))
        .await
        .unwrap()
        .unwrap();
    assert!(!supervisor.is_alive(pid));

    supervisor.finish().await;
}

#[tokio::test]
async fn test_stop_exited_agent() {
    let dir = TempDir::new().unwrap();
    let binary = script(dir.path(), "short", "exit 0");
    let supervisor = ProcessSupervisor::new(options(binary));

    let pid = supervisor.start(&client(dir.path()), &join()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), supervisor.stop(pid))
        .await
        .unwrap()
        .unwrap();
    assert!(!supervisor.is_alive(pid));
}

#[tokio::test]
async fn test_start_missing_binary() {
    let dir = TempDir::new().unwrap();
    let supervisor = ProcessSupervisor::new(options(dir.path().join("missing")));

    let result = supervisor.start(&client(dir.path()), &join()).await;

    assert!(matches!(result, Err(Error::Io(_, _))));
}

#[tokio::test]
async fn test_server_waits_for_settle() {
    let dir = TempDir::new().unwrap();
    let binary = script(dir.path(), "agent", "exec sleep 30");
    let supervisor = ProcessSupervisor::new(SupervisorOptions {
        server_settle: Duration::from_millis(300),
        ..options(binary)
    });
    let server = Node::new(
        Role::Server,
        "boxs0",
        "10.10.10.1".parse().unwrap(),
        "boxeth0",
        dir.path().join("boxs0"),
    );

    let started = std::time::Instant::now();
    let pid = supervisor.start(&server, &join()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(300));

    supervisor.stop(pid).await.unwrap();
    supervisor.finish().await;
}

#[test]
fn test_liveness_of_impossible_pids() {
    assert!(!agentbox_supervisor::is_alive(0));
    assert!(!agentbox_supervisor::is_alive(i32::MAX as u32));
}
