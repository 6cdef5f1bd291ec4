use std::path::Path;

use anyhow::Result;
use boundary::{
    probe::{Boundary, FsWorkspaceProbe, WorkspaceIdentity, WorkspaceProbe},
    watcher::BoundaryWatcher,
};
use chrono::{Local, TimeZone};
use processing::{tracking::TrackingProcessor, ProcessingModule};
use storage::year_storage::YearStorage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracker::Tracker;

use crate::{
    config::{Config, ConfigSource},
    utils::clock::{Clock, DefaultClock},
};

use event::TrackerEvent;

pub mod args;
pub mod boundary;
pub mod control;
pub mod event;
pub mod processing;
pub mod shutdown;
pub mod storage;
pub mod tracker;

pub const RECORDS_DIR: &str = "records";

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: &Path) -> Result<()> {
    let config_source = ConfigSource::in_dir(dir);
    let config = config_source.load().unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {e}");
        Config::default()
    });

    let mut probe = FsWorkspaceProbe;
    let identity = probe
        .identity(&config.workspaces, config.track_git_branch)
        .unwrap_or_else(|e| {
            warn!("Failed to probe workspaces {e:?}");
            WorkspaceIdentity::default()
        });

    let (sender, receiver) = mpsc::channel::<TrackerEvent>(10);
    let shutdown_token = CancellationToken::new();

    let watcher = create_watcher(
        sender.clone(),
        probe,
        config_source,
        &shutdown_token,
        DefaultClock,
        config.clone(),
        identity.clone(),
    );

    let boundary = Boundary::new(identity, config.track_git_branch);
    let processor =
        create_processor(dir, receiver, DefaultClock, &config, boundary, Local).await?;

    info!("Daemon started in {dir:?}");
    let (_, signal_result, watcher_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        shutdown::forward_signals(sender, shutdown_token.clone()),
        watcher.run(),
        processor.run(),
    );

    if let Err(signal_result) = signal_result {
        error!("Signal forwarding got an error {:?}", signal_result);
    }

    if let Err(watcher_result) = watcher_result {
        error!("Boundary watcher got an error {:?}", watcher_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_watcher(
    sender: mpsc::Sender<TrackerEvent>,
    probe: impl WorkspaceProbe + 'static,
    config_source: ConfigSource,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
    config: Config,
    identity: WorkspaceIdentity,
) -> BoundaryWatcher {
    BoundaryWatcher::new(
        sender,
        Box::new(probe),
        config_source,
        shutdown_token.clone(),
        Box::new(clock),
        config,
        identity,
    )
}

async fn create_processor<Tz: TimeZone>(
    dir: &Path,
    receiver: mpsc::Receiver<TrackerEvent>,
    clock: impl Clock + Clone,
    config: &Config,
    boundary: Boundary,
    timezone: Tz,
) -> Result<ProcessingModule<TrackingProcessor<YearStorage, Tz>>> {
    let storage = YearStorage::new(dir.join(RECORDS_DIR))?;
    let tracker = Tracker::start_tracking(
        storage,
        boundary,
        config.tracker_settings(),
        Box::new(clock.clone()),
        timezone,
    )
    .await;
    let processor = TrackingProcessor::new(
        tracker,
        dir,
        config.display_settings(),
        Box::new(clock.clone()),
    );
    Ok(ProcessingModule::new(
        receiver,
        processor,
        config.tick_interval(),
        Box::new(clock),
    ))
}

#[cfg(test)]
mod daemon_tests {
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::{sync::mpsc, time::Instant};
    use tokio_util::sync::CancellationToken;

    use crate::{
        config::{Config, ConfigSource},
        daemon::{
            boundary::probe::{Boundary, MockWorkspaceProbe, WorkspaceIdentity},
            create_processor, create_watcher,
            event::TrackerEvent,
            storage::year_storage::{PersistenceGateway, YearStorage},
            tracker::status::{read_status, status_path},
            RECORDS_DIR,
        },
        utils::{clock::Clock, logging::TEST_LOGGING},
    };

    #[derive(Clone)]
    struct TestClock {
        start_time: DateTime<Utc>,
        reference: Instant,
    }

    #[async_trait]
    impl Clock for TestClock {
        fn time(&self) -> DateTime<Utc> {
            self.start_time + self.reference.elapsed()
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: tokio::time::Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    fn identity(name: &str) -> WorkspaceIdentity {
        WorkspaceIdentity::new(vec![name.into()], vec![format!("{name}/main")])
    }

    /// Runs the whole daemon for a bit more than a minute of paused time with a workspace switch
    /// in the middle.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_daemon() -> Result<()> {
        *TEST_LOGGING;
        let mut probe = MockWorkspaceProbe::new();
        let mut calls = 0;
        probe.expect_identity().returning(move |_, _| {
            calls += 1;
            Ok(if calls <= 2 {
                identity("alpha")
            } else {
                identity("beta")
            })
        });

        let dir = tempdir()?;
        let config = Config::default();
        let shutdown_token = CancellationToken::new();
        let (sender, receiver) = mpsc::channel::<TrackerEvent>(10);
        let test_clock = TestClock {
            start_time: Utc.with_ymd_and_hms(2018, 7, 4, 12, 0, 0).unwrap(),
            reference: Instant::now(),
        };

        let watcher = create_watcher(
            sender,
            probe,
            ConfigSource::in_dir(dir.path()),
            &shutdown_token,
            test_clock.clone(),
            config.clone(),
            identity("alpha"),
        );
        let processor = create_processor(
            dir.path(),
            receiver,
            test_clock.clone(),
            &config,
            Boundary::new(identity("alpha"), config.track_git_branch),
            Utc,
        )
        .await?;

        let (_, watcher_result, processing_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_secs(62)).await;
                shutdown_token.cancel()
            },
            watcher.run(),
            processor.run(),
        );

        watcher_result?;
        processing_result?;

        let storage = YearStorage::new(dir.path().join(RECORDS_DIR))?;
        let data = storage.load(2018).await;

        assert_eq!(
            data.iter()
                .map(|v| v.workspace_label.as_str())
                .collect::<Vec<_>>(),
            vec!["alpha", "beta"]
        );
        assert_eq!(data[0].end, Some(data[1].start));
        assert!(data[0].duration() >= Some(chrono::Duration::seconds(10)));

        let tracked = data
            .iter()
            .filter_map(|v| v.duration())
            .fold(chrono::Duration::zero(), |acc, v| acc + v);

        let status = read_status(&status_path(dir.path()))
            .await?
            .ok_or_else(|| anyhow!("Daemon didn't publish its status"))?;
        assert!(!status.snapshot.is_tracking);
        assert_eq!(status.snapshot.session_ms, tracked.num_milliseconds());
        assert_eq!(status.snapshot.total_ms, tracked.num_milliseconds());

        Ok(())
    }
}
