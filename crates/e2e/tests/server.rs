//! Preview server bootstrap: reuse, conflicts and readiness timeouts

mod common;

use std::time::Duration;

use common::{serve_ok, unused_url};
use taskpro_e2e::config::WebServerConfig;
use taskpro_e2e::server::WebServerHandle;
use taskpro_e2e::E2eError;

fn server_config(url: String, command: &str, reuse_existing: bool) -> WebServerConfig {
    WebServerConfig {
        command: command.to_string(),
        url,
        reuse_existing,
        startup_timeout: Duration::from_millis(800),
    }
}

#[tokio::test]
async fn reuses_running_server() {
    let (url, hits) = serve_ok().await;
    let handle = WebServerHandle::start(&server_config(url.clone(), "exit 1", true))
        .await
        .unwrap();

    assert!(handle.reused());
    assert_eq!(handle.url(), url);
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn running_server_is_a_conflict_without_reuse() {
    let (url, _) = serve_ok().await;
    let err = WebServerHandle::start(&server_config(url, "exit 1", false))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, E2eError::ServerStartup(ref msg) if msg.contains("already used")));
}

#[cfg(unix)]
#[tokio::test]
async fn silent_server_times_out() {
    let url = unused_url().await;
    let err = WebServerHandle::start(&server_config(url, "sleep 30", true))
        .await
        .err()
        .unwrap();

    match err {
        E2eError::ServerHealthCheck(attempts) => assert!(attempts >= 1),
        other => panic!("expected health check failure, got {}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn early_exit_is_reported() {
    let url = unused_url().await;
    let err = WebServerHandle::start(&server_config(url, "exit 3", true))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, E2eError::ServerStartup(ref msg) if msg.contains("exited early")));
}
