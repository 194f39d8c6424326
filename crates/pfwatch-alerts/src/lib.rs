// SPDX-License-Identifier: GPL-3.0-or-later
use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;

use pfwatch_config::{AlertKind, AlertsConfig};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Audible "party full" notification.
#[async_trait::async_trait]
pub trait AlertPort: Send + Sync + 'static {
    /// Start playing. Returns a handle when the alert can be stopped early.
    async fn play(&self) -> Option<AlertHandle>;

    fn kind(&self) -> AlertKind;
}

/// Stops a playing alert. Dropping the handle lets the alert run to completion.
pub struct AlertHandle {
    stop: Option<Box<dyn FnOnce() + Send>>,
}

impl AlertHandle {
    pub fn new(stop: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop: Some(Box::new(stop)),
        }
    }

    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
    }
}

impl std::fmt::Debug for AlertHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertHandle")
            .field("stoppable", &self.stop.is_some())
            .finish()
    }
}

pub struct NoopAlert;

#[async_trait::async_trait]
impl AlertPort for NoopAlert {
    async fn play(&self) -> Option<AlertHandle> {
        info!(target: "alerts", "noop alert");
        None
    }

    fn kind(&self) -> AlertKind {
        AlertKind::None
    }
}

/// Rings the terminal bell on stdout.
pub struct TerminalBell;

#[async_trait::async_trait]
impl AlertPort for TerminalBell {
    async fn play(&self) -> Option<AlertHandle> {
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = stdout.write_all(b"\x07").and_then(|_| stdout.flush()) {
            error!(target: "alerts", error = %err, "failed to ring terminal bell");
        }
        None
    }

    fn kind(&self) -> AlertKind {
        AlertKind::Bell
    }
}

/// Runs an external player, e.g. `paplay full_party.ogg`.
pub struct CommandAlert {
    program: String,
    args: Vec<String>,
}

impl CommandAlert {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait::async_trait]
impl AlertPort for CommandAlert {
    async fn play(&self) -> Option<AlertHandle> {
        let mut child = match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                error!(target: "alerts", program = %self.program, error = %err, "failed to start alert player");
                return None;
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let program = self.program.clone();
        tokio::spawn(async move {
            let stopped = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            warn!(target: "alerts", %program, %status, "alert player exited with failure");
                        }
                        Ok(_) => debug!(target: "alerts", %program, "alert finished"),
                        Err(err) => error!(target: "alerts", %program, error = %err, "failed to wait for alert player"),
                    }
                    false
                }
                Ok(()) = stop_rx => true,
            };

            if stopped {
                if let Err(err) = child.kill().await {
                    warn!(target: "alerts", %program, error = %err, "failed to stop alert player");
                } else {
                    debug!(target: "alerts", %program, "alert stopped early");
                }
            }
        });

        Some(AlertHandle::new(move || {
            let _ = stop_tx.send(());
        }))
    }

    fn kind(&self) -> AlertKind {
        AlertKind::Command
    }
}

/// Build the configured alert adapter.
pub fn from_config(config: &AlertsConfig) -> Arc<dyn AlertPort> {
    match config.kind {
        AlertKind::None => Arc::new(NoopAlert),
        AlertKind::Bell => Arc::new(TerminalBell),
        AlertKind::Command => match &config.command {
            Some(program) if !program.trim().is_empty() => {
                Arc::new(CommandAlert::new(program.clone(), config.args.clone()))
            }
            _ => {
                warn!(target: "alerts", "alerts.kind = \"command\" without alerts.command, using terminal bell");
                Arc::new(TerminalBell)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn noop_alert_has_no_handle() {
        assert!(NoopAlert.play().await.is_none());
    }

    #[test]
    fn handle_runs_stop_once() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        let handle = AlertHandle::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!stopped.load(Ordering::SeqCst));
        handle.stop();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn adapter_follows_configured_kind() {
        let mut config = AlertsConfig::default();
        assert_eq!(from_config(&config).kind(), AlertKind::Bell);

        config.kind = AlertKind::None;
        assert_eq!(from_config(&config).kind(), AlertKind::None);

        config.kind = AlertKind::Command;
        config.command = Some("paplay".to_string());
        assert_eq!(from_config(&config).kind(), AlertKind::Command);
    }

    #[test]
    fn command_kind_without_program_falls_back_to_bell() {
        let mut config = AlertsConfig {
            kind: AlertKind::Command,
            command: None,
            args: Vec::new(),
        };
        assert_eq!(from_config(&config).kind(), AlertKind::Bell);

        config.command = Some("   ".to_string());
        assert_eq!(from_config(&config).kind(), AlertKind::Bell);
    }

    #[tokio::test]
    async fn missing_program_yields_no_handle() {
        let alert = CommandAlert::new("pfwatch-definitely-missing-player", Vec::new());
        assert!(alert.play().await.is_none());
    }

    #[cfg(unix)]
    fn touch_after(delay_secs: u32, marker: &std::path::Path) -> CommandAlert {
        CommandAlert::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("sleep {}; touch '{}'", delay_secs, marker.display()),
            ],
        )
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unstopped_command_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let handle = touch_after(0, &marker).play().await;
        assert!(handle.is_some());

        for _ in 0..50 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert!(marker.exists());
        drop(handle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stopping_kills_the_player_before_it_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let handle = touch_after(1, &marker).play().await.expect("sh should spawn");

        handle.stop();
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        assert!(!marker.exists());
    }
}
