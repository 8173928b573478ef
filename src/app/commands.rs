//! Commands the collector piggybacks on its replies.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::model::ServerCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Uninstall { reason: Option<String> },
}

impl Command {
    pub fn parse(cmd: &ServerCommand) -> Option<Self> {
        match cmd.command.as_str() {
            "uninstall" => Some(Self::Uninstall {
                reason: cmd
                    .params
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            }),
            _ => None,
        }
    }
}

/// Run `command` through `sh -c` after `delay`, detached from the caller.
/// The handle resolves to the exit status, or `None` if it never ran.
pub fn schedule_uninstall(command: String, delay: Duration) -> JoinHandle<Option<ExitStatus>> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::warn!(command = %command, "running uninstall command");
        let run = tokio::task::spawn_blocking(move || {
            std::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .status()
        });
        match run.await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "uninstall command finished");
                Some(status)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to launch uninstall command");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "uninstall task failed");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_uninstall_is_recognised() {
        let uninstall = ServerCommand {
            command: "uninstall".into(),
            ..Default::default()
        };
        assert_eq!(
            Command::parse(&uninstall),
            Some(Command::Uninstall { reason: None })
        );

        let other = ServerCommand {
            command: "reboot".into(),
            ..Default::default()
        };
        assert_eq!(Command::parse(&other), None);
    }

    #[test]
    fn uninstall_carries_the_collector_reason() {
        let cmd: ServerCommand = serde_json::from_str(
            r#"{"command":"uninstall","params":{"reason":"host decommissioned"}}"#,
        )
        .unwrap();
        assert_eq!(
            Command::parse(&cmd),
            Some(Command::Uninstall {
                reason: Some("host decommissioned".into())
            })
        );

        let odd: ServerCommand =
            serde_json::from_str(r#"{"command":"uninstall","params":{"reason":42}}"#).unwrap();
        assert_eq!(Command::parse(&odd), Some(Command::Uninstall { reason: None }));
    }

    #[tokio::test]
    async fn uninstall_runs_after_the_delay() {
        let started = std::time::Instant::now();
        let status = schedule_uninstall("exit 7".into(), Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.code(), Some(7));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
