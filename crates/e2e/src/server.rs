//! Local preview server - spawning, reuse and readiness polling

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::WebServerConfig;
use crate::error::{E2eError, E2eResult};

/// How long a started server gets to exit after SIGTERM
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Handle to the preview server for the whole run.
///
/// Owns the process only when this run started it; a reused server is left
/// alone on drop.
pub struct WebServerHandle {
    child: Option<Child>,
    url: String,
}

impl WebServerHandle {
    /// Make sure a server answers on `config.url`, starting one if needed
    pub async fn start(config: &WebServerConfig) -> E2eResult<Self> {
        let client = readiness_client()?;

        if is_ready(&client, &config.url).await {
            if config.reuse_existing {
                info!("Reusing server already running at {}", config.url);
                return Ok(Self { child: None, url: config.url.clone() });
            }
            return Err(E2eError::ServerStartup(format!(
                "{} is already used, make sure that nothing is running on the port/url or enable reuse_existing",
                config.url
            )));
        }

        info!("Starting web server: {}", config.command);
        let child = spawn_shell(&config.command).map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn '{}': {}", config.command, e))
        })?;

        let mut handle = Self {
            child: Some(child),
            url: config.url.clone(),
        };

        if let Err(e) = handle.wait_until_ready(&client, config.startup_timeout).await {
            handle.shutdown().await;
            return Err(e);
        }

        info!("Server is ready at {}", handle.url);
        Ok(handle)
    }

    /// Poll the readiness URL until it answers
    async fn wait_until_ready(&mut self, client: &reqwest::Client, timeout: Duration) -> E2eResult<()> {
        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout {
            attempts += 1;

            if is_ready(client, &self.url).await {
                return Ok(());
            }

            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(E2eError::ServerStartup(format!(
                        "server process exited early with {}",
                        status
                    )));
                }
            }

            if attempts == 1 {
                info!("Waiting for server to start...");
            }
            sleep(Duration::from_millis(100)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether an already running server was picked up instead of spawned
    pub fn reused(&self) -> bool {
        self.child.is_none()
    }

    /// Stop the server if this run owns it.
    ///
    /// The whole process group gets SIGTERM and up to [`SHUTDOWN_GRACE`] to
    /// exit before it is killed.
    pub async fn shutdown(mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        info!("Stopping server (pid: {})", child.id());

        if terminate_group(&child) {
            let deadline = Instant::now() + SHUTDOWN_GRACE;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!("Server exited with {}", status);
                        return;
                    }
                    Ok(None) => sleep(Duration::from_millis(50)).await,
                    Err(e) => {
                        warn!("Failed to poll server process: {}", e);
                        break;
                    }
                }
            }
        }
        kill_and_reap(child);
    }

    /// Stop the server without a grace period
    pub fn stop(&mut self) {
        if let Some(child) = self.child.take() {
            info!("Stopping server (pid: {})", child.id());
            terminate_group(&child);
            kill_and_reap(child);
        }
    }
}

impl Drop for WebServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Signal the server's process group; the shell runs in its own group so
/// grandchildren (npm -> vite) go down with it
fn terminate_group(child: &Child) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        killpg(Pid::from_raw(child.id() as i32), Signal::SIGTERM).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = child;
        false
    }
}

fn kill_and_reap(mut child: Child) {
    if let Err(e) = child.kill() {
        debug!("Server already gone: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap server process: {}", e);
    }
}

fn readiness_client() -> E2eResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?)
}

/// A server counts as ready on 2xx/3xx, or 400-403 (it answered, just not happily)
async fn is_ready(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => accepts_status(resp.status()),
        Err(e) => {
            // Connection refused is expected while the server is starting
            if !e.is_connect() && !e.is_timeout() {
                debug!("Readiness check error: {}", e);
            }
            false
        }
    }
}

fn accepts_status(status: StatusCode) -> bool {
    status.is_success() || status.is_redirection() || (400..=403).contains(&status.as_u16())
}

fn spawn_shell(command: &str) -> std::io::Result<Child> {
    #[cfg(unix)]
    let mut cmd = {
        use std::os::unix::process::CommandExt;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).process_group(0);
        cmd
    };

    #[cfg(not(unix))]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
}
