mod common;

use chatpad::backends::VirtualConsole;
use chatpad::listener::EventLog;
use chatpad::{
    Button, Config, Coordinator, Device, DeviceSnapshot, DeviceWorker, Error, InputKind,
    ShutdownCause, ShutdownFlag, SnapshotStore, TranscriptStream, WorkerSettings, WorkerState,
};
use common::{ScriptedStream, TestPad};
use std::io::Write;
use std::time::Duration;

const IMAGE: &[u8] = b"lifecycle test program image";

fn quick_settings() -> WorkerSettings {
    WorkerSettings {
        settle_ticks: 5,
        tick_interval: Duration::from_millis(1),
        snapshot_interval: Duration::from_secs(3600),
        save_on_exit: true,
        speed: 1,
    }
}

fn console_factory() -> impl FnMut() -> chatpad::Result<Box<dyn Device>> + Send + 'static {
    || -> chatpad::Result<Box<dyn Device>> { Ok(Box::new(VirtualConsole::new("vc", IMAGE)?)) }
}

fn frame_of(snapshot: &DeviceSnapshot) -> u64 {
    let mut probe = VirtualConsole::new("probe", IMAGE).unwrap();
    probe.load_snapshot(snapshot).unwrap();
    probe.frame()
}

#[tokio::test]
async fn undersized_snapshot_is_skipped_and_device_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.sav");
    std::fs::write(&path, b"{}").unwrap();

    let shutdown = ShutdownFlag::new();
    let mut worker = DeviceWorker::new(
        console_factory(),
        SnapshotStore::new(&path),
        WorkerSettings {
            tick_interval: Duration::from_millis(50),
            ..quick_settings()
        },
        shutdown.clone(),
    )
    .spawn();

    let device = worker.device().await.unwrap();
    let frame = frame_of(&device.save_snapshot().unwrap());
    // Fresh boot: only the settle ticks plus at most a few loop ticks.
    assert!(frame >= 5 && frame < 1000, "frame {frame}");

    shutdown.cancel();
    worker.wait_stopped().await;
    worker.join().await.unwrap();
}

#[tokio::test]
async fn snapshot_is_restored_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("saves/state.sav"));

    let mut seed = VirtualConsole::new("seed", IMAGE).unwrap();
    for _ in 0..1_000 {
        seed.tick().unwrap();
    }
    store.save(&seed.save_snapshot().unwrap()).unwrap();

    let shutdown = ShutdownFlag::new();
    let mut worker = DeviceWorker::new(
        console_factory(),
        store.clone(),
        quick_settings(),
        shutdown.clone(),
    )
    .spawn();
    let device = worker.device().await.unwrap();
    assert!(frame_of(&device.save_snapshot().unwrap()) >= 1_000);

    shutdown.cancel();
    worker.join().await.unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
    // save_on_exit wrote a newer state.
    assert!(frame_of(&store.load().unwrap()) >= 1_000);
}

#[tokio::test]
async fn snapshot_from_another_program_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.sav"));
    let mut other = VirtualConsole::new("other", b"some other program").unwrap();
    store.save(&other.save_snapshot().unwrap()).unwrap();

    let shutdown = ShutdownFlag::new();
    let mut worker =
        DeviceWorker::new(console_factory(), store, quick_settings(), shutdown.clone()).spawn();
    let device = worker.device().await.unwrap();
    assert!(frame_of(&device.save_snapshot().unwrap()) >= 5);

    shutdown.cancel();
    worker.join().await.unwrap();
}

#[tokio::test]
async fn periodic_snapshots_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("state.sav"));
    let shutdown = ShutdownFlag::new();
    let settings = WorkerSettings {
        snapshot_interval: Duration::from_millis(20),
        save_on_exit: false,
        ..quick_settings()
    };
    let mut worker =
        DeviceWorker::new(console_factory(), store.clone(), settings, shutdown.clone()).spawn();
    worker.device().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.load().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("a periodic snapshot");

    shutdown.cancel();
    worker.join().await.unwrap();
}

#[tokio::test]
async fn tick_failure_stops_worker_and_raises_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let pad = TestPad::default();
    pad.with(|s| s.fail_after_ticks = Some(20));
    let factory = {
        let pad = pad.clone();
        move || -> chatpad::Result<Box<dyn Device>> { Ok(pad.boxed()) }
    };

    let shutdown = ShutdownFlag::new();
    let mut worker = DeviceWorker::new(
        factory,
        SnapshotStore::new(dir.path().join("state.sav")),
        quick_settings(),
        shutdown.clone(),
    )
    .spawn();

    tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled())
        .await
        .expect("worker failure raises shutdown");
    worker.wait_stopped().await;
    assert!(matches!(worker.join().await, Err(Error::Device(_))));
    assert!(pad.with(|s| s.stopped));
    // No final snapshot after a failure.
    assert!(!dir.path().join("state.sav").exists());
}

#[tokio::test]
async fn device_that_fails_to_settle_is_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let pad = TestPad::default();
    pad.with(|s| s.fail_after_ticks = Some(2));
    let factory = {
        let pad = pad.clone();
        move || -> chatpad::Result<Box<dyn Device>> { Ok(pad.boxed()) }
    };

    let shutdown = ShutdownFlag::new();
    let mut worker = DeviceWorker::new(
        factory,
        SnapshotStore::new(dir.path().join("state.sav")),
        quick_settings(),
        shutdown.clone(),
    )
    .spawn();

    assert!(matches!(worker.join().await, Err(Error::Device(_))));
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert!(matches!(worker.device().await, Err(Error::HandleUnavailable)));
    assert!(shutdown.is_cancelled());
    assert!(pad.with(|s| s.stopped));
}

fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.snapshot.path = dir.join("state.sav");
    config.device.settle_ticks = 2;
    config.device.tick_interval_ms = 1;
    config.stream.poll_interval_ms = 10;
    config.stream.startup_timeout_ms = 300;
    config.dispatch.hold_ms = 1;
    config.dispatch.gap_ms = 1;
    config
}

#[tokio::test]
async fn coordinator_runs_the_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("chat.log");
    std::fs::write(&transcript, "This groupchat is not anonymous\n").unwrap();

    let log = EventLog::new();
    let factory = {
        let log = log.clone();
        move || -> chatpad::Result<Box<dyn Device>> {
            Ok(Box::new(VirtualConsole::new("vc", IMAGE)?.with_listener(log.clone())))
        }
    };

    let config = test_config(dir.path());
    let stream = Box::new(TranscriptStream::new(&transcript));
    let mut coordinator = Coordinator::start(&config, factory, stream).await.unwrap();
    assert_eq!(coordinator.worker_state(), WorkerState::Running);

    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&transcript).unwrap();
        writeln!(f, "judy 17:00 left 2").unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let lefts = log
                .events()
                .iter()
                .filter(|e| e.kind == InputKind::ButtonPressed { button: Button::Left })
                .count();
            if lefts == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both presses dispatched");

    coordinator.shutdown().await.unwrap();
    coordinator.shutdown().await.unwrap();
    assert!(coordinator.shutdown_flag().is_cancelled());
    assert_eq!(coordinator.worker_state(), WorkerState::Stopped);
    assert!(dir.path().join("state.sav").exists());
}

#[tokio::test]
async fn coordinator_reports_worker_failure() {
    let dir = tempfile::tempdir().unwrap();
    let pad = TestPad::default();
    pad.with(|s| s.fail_after_ticks = Some(30));
    let factory = {
        let pad = pad.clone();
        move || -> chatpad::Result<Box<dyn Device>> { Ok(pad.boxed()) }
    };
    let stream = ScriptedStream::new(&["kim 18:00 b"]);

    let mut coordinator = Coordinator::start(&test_config(dir.path()), factory, stream.boxed())
        .await
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), coordinator.run_until_shutdown())
        .await
        .expect("worker failure ends the run");
    assert!(matches!(result, Err(Error::Device(_))));
    assert!(stream.is_closed());
    assert!(pad.with(|s| s.stopped));

    // Idempotent after the fact.
    coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn worker_panic_ends_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let pad = TestPad::default();
    pad.with(|s| s.panic_after_ticks = Some(20));
    let factory = {
        let pad = pad.clone();
        move || -> chatpad::Result<Box<dyn Device>> { Ok(pad.boxed()) }
    };
    let stream = ScriptedStream::new(&["liam 19:00 up"]);

    let mut coordinator = Coordinator::start(&test_config(dir.path()), factory, stream.boxed())
        .await
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), coordinator.run_until_shutdown())
        .await
        .expect("worker panic ends the run");
    assert!(matches!(result, Err(Error::WorkerPanicked)));
    assert!(coordinator.shutdown_flag().is_cancelled());
    assert_eq!(coordinator.worker_state(), WorkerState::Stopped);
    assert!(stream.is_closed());
    assert!(pad.with(|s| s.stopped));
}

#[tokio::test]
async fn startup_fails_cleanly_without_first_message() {
    let dir = tempfile::tempdir().unwrap();
    let pad = TestPad::default();
    let factory = {
        let pad = pad.clone();
        move || -> chatpad::Result<Box<dyn Device>> { Ok(pad.boxed()) }
    };
    let stream = ScriptedStream::default();

    let err = Coordinator::start(&test_config(dir.path()), factory, stream.boxed())
        .await
        .err()
        .expect("startup error");
    assert!(matches!(err, Error::StreamTimeout(_)));
    assert!(stream.is_closed());
    assert!(pad.with(|s| s.stopped));
}

#[test]
fn shutdown_cause_is_comparable() {
    assert_ne!(ShutdownCause::Interrupt, ShutdownCause::Signalled);
}
