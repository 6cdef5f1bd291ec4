use anyhow::Result;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::event::TrackerEvent;

/// Detects signals asking the process to exit: Ctrl-C everywhere and SIGTERM on unix, which is
/// what `worktally stop` sends.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                    _ = cancelation.cancelled() => return,
                }
            }
            Err(e) => {
                tracing::warn!("Can't listen for SIGTERM {e:?}");
                select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = cancelation.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = cancelation.cancelled() => return,
        }
    }
    info!("Received shutdown signal");
    cancelation.cancel();
}

/// Turns SIGUSR1 into [TrackerEvent::Toggle], SIGUSR2 into [TrackerEvent::Save] and SIGHUP into
/// [TrackerEvent::Control]. Returns on shutdown, dropping its sender.
#[cfg(unix)]
pub async fn forward_signals(
    next: mpsc::Sender<TrackerEvent>,
    cancelation: CancellationToken,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut toggle = signal(SignalKind::user_defined1())?;
    let mut save = signal(SignalKind::user_defined2())?;
    let mut control = signal(SignalKind::hangup())?;
    loop {
        let event = select! {
            _ = cancelation.cancelled() => return Ok(()),
            _ = toggle.recv() => TrackerEvent::Toggle,
            _ = save.recv() => TrackerEvent::Save,
            _ = control.recv() => TrackerEvent::Control,
        };
        info!("Received {event:?} signal");
        next.send(event).await?;
    }
}

/// Control signals are only available on unix.
#[cfg(not(unix))]
pub async fn forward_signals(
    next: mpsc::Sender<TrackerEvent>,
    cancelation: CancellationToken,
) -> Result<()> {
    cancelation.cancelled().await;
    drop(next);
    Ok(())
}
