//! Camera command - presence check, access request and PipeWire remote

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use portico_core::{ConfigFile, Outcome, Portal, ResultChannel};
use serde::Serialize;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for the portal to confirm a withdrawn request
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Arguments for the camera command
#[derive(Args)]
pub struct CameraArgs {
    #[command(subcommand)]
    pub command: CameraCommand,
}

#[derive(Subcommand)]
pub enum CameraCommand {
    /// Check whether the system has a camera
    Present {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the user for camera access
    Access {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Request access, then open a PipeWire remote exposing the camera
    Remote,
}

#[derive(Debug, Serialize)]
struct PresenceReport {
    present: bool,
}

#[derive(Debug, Serialize)]
struct AccessReport {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'static str>,
    elapsed_ms: u64,
}

impl AccessReport {
    fn new(outcome: &Outcome, elapsed: Duration) -> Self {
        let (error, hint) = match outcome {
            Outcome::Failed(e) => (Some(e.to_string()), e.user_hint()),
            _ => (None, None),
        };
        Self {
            outcome: outcome.label(),
            error,
            hint,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Run camera subcommand
pub async fn camera(args: CameraArgs, config: &ConfigFile) -> Result<()> {
    let portal = Portal::connect_with(config)
        .await
        .context("Failed to connect to xdg-desktop-portal")?;

    match args.command {
        CameraCommand::Present { json } => {
            let present = portal.camera().is_present().await;
            if json {
                println!("{}", serde_json::to_string(&PresenceReport { present })?);
            } else {
                println!("Camera present: {}", if present { "yes" } else { "no" });
            }
        }
        CameraCommand::Access { json } => {
            if !json {
                println!("Requesting camera access...");
                println!("(A permission dialog may appear; press Ctrl+C to withdraw)\n");
            }

            let started = Instant::now();
            let cancel = CancellationToken::new();
            let channel = portal.camera().access(Some(cancel.clone()));
            let outcome = wait_for_answer(channel, cancel, config.requests.timeout()).await;
            let report = AccessReport::new(&outcome, started.elapsed());

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            match outcome {
                Outcome::Granted(_) => println!("Camera access granted."),
                Outcome::Denied => println!("Camera access was not granted."),
                Outcome::Failed(e) => {
                    if let Some(hint) = report.hint {
                        eprintln!("Hint: {}", hint);
                    }
                    bail!("Camera access failed: {}", e);
                }
            }
        }
        CameraCommand::Remote => {
            let cancel = CancellationToken::new();
            let channel = portal.camera().access(Some(cancel.clone()));
            match wait_for_answer(channel, cancel, config.requests.timeout()).await {
                Outcome::Granted(_) => {}
                Outcome::Denied => bail!("Camera access was not granted"),
                Outcome::Failed(e) => bail!("Camera access failed: {}", e),
            }

            let fd = portal
                .camera()
                .open_pipewire_remote()
                .await
                .context("Failed to open PipeWire remote")?;

            println!("PipeWire remote opened.");
            println!("  File descriptor: {}", fd.as_raw_fd());
            println!();
            println!("Pass this descriptor to pw_context_connect_fd() to reach the camera nodes.");
        }
    }

    Ok(())
}

/// Wait for the portal's answer, withdrawing the request on Ctrl+C or timeout
///
/// After withdrawal the portal still gets [`CLOSE_GRACE`] to confirm; if it
/// stays silent the request counts as denied.
async fn wait_for_answer(
    mut channel: ResultChannel,
    cancel: CancellationToken,
    limit: Option<Duration>,
) -> Outcome {
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    tokio::select! {
        outcome = &mut channel => return outcome,
        _ = signal::ctrl_c() => {
            println!("\nReceived interrupt signal...");
            info!("Withdrawing request after interrupt");
        }
        _ = &mut deadline => {
            warn!("No answer within {:?}, withdrawing request", limit.unwrap_or_default());
        }
    }

    cancel.cancel();
    tokio::time::timeout(CLOSE_GRACE, channel)
        .await
        .unwrap_or(Outcome::Denied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::PortalError;
    use portico_core::request::channel;
    use portico_core::transport::Vardict;

    #[tokio::test]
    async fn test_wait_returns_outcome() {
        let (resolver, result) = channel();
        resolver.resolve(Outcome::Granted(Vardict::new()));

        let outcome = wait_for_answer(result, CancellationToken::new(), None).await;
        assert!(outcome.is_granted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_withdraws_after_timeout() {
        let (_resolver, result) = channel();
        let cancel = CancellationToken::new();

        let outcome =
            wait_for_answer(result, cancel.clone(), Some(Duration::from_secs(30))).await;
        assert!(cancel.is_cancelled());
        assert!(outcome.is_denied());
    }

    #[test]
    fn test_access_report_json() {
        let report = AccessReport::new(
            &Outcome::Failed(PortalError::RemoteDenied(None)),
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&report).expect("Should serialize");
        assert_eq!(json["outcome"], "failed");
        assert_eq!(json["elapsed_ms"], 1500);
        assert!(json["hint"].is_string());

        let granted = AccessReport::new(&Outcome::Granted(Vardict::new()), Duration::ZERO);
        let json = serde_json::to_value(&granted).expect("Should serialize");
        assert!(json.get("error").is_none());
    }
}
