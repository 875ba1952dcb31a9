//! End-to-end tests for the sync engine driven by a scripted watch source

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use twinsync::executor::Mirror;
use twinsync::resolver::ConflictResolver;
use twinsync::watch::{DirectoryWatcher, WatchSignal, WatchSource};
use twinsync::{Config, Engine, EventKind, RawEvent, RootPair, SyncError};

const IDLE: Duration = Duration::from_secs(10);

/// Replays queued batches and records watch registrations
#[derive(Default)]
struct ScriptedSource {
    batches: VecDeque<Vec<WatchSignal>>,
    watched: Vec<PathBuf>,
}

impl DirectoryWatcher for ScriptedSource {
    fn watch(&mut self, dir: &Path) -> Result<(), SyncError> {
        if !self.watched.iter().any(|d| d == dir) {
            self.watched.push(dir.to_path_buf());
        }
        Ok(())
    }

    fn unwatch(&mut self, dir: &Path) -> Result<(), SyncError> {
        self.watched.retain(|d| d != dir);
        Ok(())
    }
}

impl WatchSource for ScriptedSource {
    fn next_batch(&mut self) -> Option<Vec<WatchSignal>> {
        self.batches.pop_front()
    }
}

struct Fixture {
    _temp: TempDir,
    left: PathBuf,
    right: PathBuf,
    config: Config,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let left = temp.path().join("A");
    let right = temp.path().join("B");
    fs::create_dir(&left).unwrap();
    fs::create_dir(&right).unwrap();
    let config = Config {
        pairs: vec![RootPair::new(&left, &right)],
        debounce_ms: 50,
        workers: 2,
        exclude: vec!["*.tmp".to_string()],
        ..Config::default()
    };
    Fixture {
        _temp: temp,
        left,
        right,
        config,
    }
}

type TestEngine = Engine<ScriptedSource, Mirror>;

fn start(fixture: &Fixture, source: ScriptedSource) -> (TestEngine, Arc<Mirror>) {
    let mirror = Arc::new(Mirror::new(ConflictResolver::new(
        fixture.config.retry_policy(),
    )));
    let engine =
        Engine::start(&fixture.config, source, Arc::clone(&mirror)).expect("engine should start");
    (engine, mirror)
}

fn event(dir: &Path, name: &str, kind: EventKind) -> WatchSignal {
    WatchSignal::Event(RawEvent::new(dir, name, kind))
}

/// Hand an event to the engine only if its directory is watched, as the OS
/// would
fn deliver(engine: &mut TestEngine, dir: &Path, name: &str, kind: EventKind) {
    if engine.source().watched.iter().any(|d| d == dir) {
        engine.handle(event(dir, name, kind));
    }
}

#[test]
fn test_created_file_is_mirrored() {
    let fx = fixture();
    let (mut engine, mirror) = start(&fx, ScriptedSource::default());

    fs::write(fx.left.join("x.txt"), b"hi").unwrap();
    engine.handle(event(&fx.left, "x.txt", EventKind::Create));

    assert!(engine.wait_idle(IDLE));
    assert_eq!(fs::read(fx.right.join("x.txt")).unwrap(), b"hi");
    assert_eq!(mirror.stats().applied, 1);
}

#[test]
fn test_deleted_file_is_removed_from_other_side() {
    let fx = fixture();
    fs::write(fx.left.join("x.txt"), b"hi").unwrap();
    fs::write(fx.right.join("x.txt"), b"hi").unwrap();
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    fs::remove_file(fx.right.join("x.txt")).unwrap();
    engine.handle(event(&fx.right, "x.txt", EventKind::Delete));

    assert!(engine.wait_idle(IDLE));
    assert!(!fx.left.join("x.txt").exists());
}

#[test]
fn test_change_in_existing_subdirectory() {
    let fx = fixture();
    fs::create_dir(fx.left.join("sub")).unwrap();
    fs::create_dir(fx.right.join("sub")).unwrap();
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    assert!(engine.source().watched.contains(&fx.right.join("sub")));

    fs::write(fx.left.join("sub/y.txt"), b"nested").unwrap();
    engine.handle(event(&fx.left.join("sub"), "y.txt", EventKind::Create));

    assert!(engine.wait_idle(IDLE));
    assert_eq!(fs::read(fx.right.join("sub/y.txt")).unwrap(), b"nested");
}

#[test]
fn test_new_directory_is_mirrored_and_watched() {
    let fx = fixture();
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    fs::create_dir(fx.left.join("new")).unwrap();
    engine.handle(event(&fx.left, "new", EventKind::Create));
    assert!(engine.source().watched.contains(&fx.left.join("new")));
    assert_eq!(
        engine.registry().symmetric_of(&fx.left.join("new")).unwrap(),
        fx.right.join("new")
    );

    fs::write(fx.left.join("new/f.txt"), b"inside").unwrap();
    engine.handle(event(&fx.left.join("new"), "f.txt", EventKind::Create));

    assert!(engine.wait_idle(IDLE));
    assert!(fx.right.join("new").is_dir());
    assert_eq!(fs::read(fx.right.join("new/f.txt")).unwrap(), b"inside");
}

#[test]
fn test_burst_of_modifies_applies_last_content() {
    let fx = fixture();
    fs::write(fx.left.join("doc.txt"), b"v0").unwrap();
    fs::write(fx.right.join("doc.txt"), b"v0").unwrap();
    let (mut engine, mirror) = start(&fx, ScriptedSource::default());

    for version in 1..=5 {
        fs::write(fx.left.join("doc.txt"), format!("v{version}")).unwrap();
        engine.handle(event(&fx.left, "doc.txt", EventKind::Modify));
    }

    assert!(engine.wait_idle(IDLE));
    assert_eq!(fs::read(fx.right.join("doc.txt")).unwrap(), b"v5");
    assert_eq!(mirror.stats().applied, 1);
    let pool = engine.shutdown(IDLE);
    assert_eq!(pool.scheduled, 5);
    assert_eq!(pool.executed, 1);
}

#[test]
fn test_mirrored_change_does_not_bounce_back() {
    let fx = fixture();
    let (mut engine, mirror) = start(&fx, ScriptedSource::default());

    fs::write(fx.left.join("x.txt"), b"once").unwrap();
    engine.handle(event(&fx.left, "x.txt", EventKind::Create));
    assert!(engine.wait_idle(IDLE));

    // The write to B is observed by B's watch and arrives as an event
    engine.handle(event(&fx.right, "x.txt", EventKind::Modify));
    assert!(engine.wait_idle(IDLE));

    let stats = mirror.stats();
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(fs::read(fx.left.join("x.txt")).unwrap(), b"once");
}

#[test]
fn test_modify_for_missing_target_creates_it() {
    let fx = fixture();
    let (mut engine, mirror) = start(&fx, ScriptedSource::default());

    fs::write(fx.left.join("saved.txt"), b"renamed into place").unwrap();
    engine.handle(event(&fx.left, "saved.txt", EventKind::Modify));

    assert!(engine.wait_idle(IDLE));
    assert_eq!(
        fs::read(fx.right.join("saved.txt")).unwrap(),
        b"renamed into place"
    );
    assert_eq!(mirror.stats().applied, 1);
}

#[test]
fn test_directory_delete_raises_no_mismatch() {
    let fx = fixture();
    for root in [&fx.left, &fx.right] {
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/y.txt"), b"inside").unwrap();
    }
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());
    let left_sub = fx.left.join("sub");
    let right_sub = fx.right.join("sub");

    fs::remove_dir_all(&left_sub).unwrap();
    deliver(&mut engine, &left_sub, "y.txt", EventKind::Delete);
    deliver(&mut engine, &fx.left, "sub", EventKind::Delete);
    engine.handle(WatchSignal::Invalidated(left_sub.clone()));
    assert!(!engine.source().watched.contains(&right_sub));

    assert!(engine.wait_idle(IDLE));
    assert!(!right_sub.exists());

    // What B's watches report about the mirrored delete
    deliver(&mut engine, &right_sub, "y.txt", EventKind::Delete);
    deliver(&mut engine, &fx.right, "sub", EventKind::Delete);
    assert!(engine.wait_idle(IDLE));

    assert_eq!(engine.summary().mismatches, 0);
    assert!(!fx.left.join("sub").exists());
    assert!(engine.source().watched.contains(&fx.right));
}

#[test]
fn test_excluded_entries_are_not_mirrored() {
    let fx = fixture();
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    fs::write(fx.left.join("scratch.tmp"), b"junk").unwrap();
    engine.handle(event(&fx.left, "scratch.tmp", EventKind::Create));

    assert!(engine.wait_idle(IDLE));
    assert!(!fx.right.join("scratch.tmp").exists());
    assert_eq!(engine.summary().excluded, 1);
    assert_eq!(engine.summary().events, 0);
}

#[test]
fn test_event_for_unregistered_directory_is_counted() {
    let fx = fixture();
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    engine.handle(event(Path::new("/nowhere/at/all"), "x", EventKind::Create));

    assert_eq!(engine.summary().mismatches, 1);
}

#[test]
fn test_overflow_resyncs_unobserved_changes() {
    let fx = fixture();
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    fs::write(fx.left.join("missed.txt"), b"left only").unwrap();
    fs::create_dir(fx.right.join("later")).unwrap();
    fs::write(fx.right.join("later/deep.txt"), b"right only").unwrap();

    engine.handle(WatchSignal::Overflow { dir: None });
    assert!(engine.wait_idle(IDLE));

    assert_eq!(fs::read(fx.right.join("missed.txt")).unwrap(), b"left only");
    assert!(fx.left.join("later").is_dir());
    assert!(engine.source().watched.contains(&fx.right.join("later")));

    assert_eq!(fs::read(fx.left.join("later/deep.txt")).unwrap(), b"right only");

    fs::write(fx.right.join("later/more.txt"), b"second").unwrap();
    engine.handle(WatchSignal::Overflow {
        dir: Some(fx.right.join("later")),
    });
    assert!(engine.wait_idle(IDLE));
    assert_eq!(fs::read(fx.left.join("later/more.txt")).unwrap(), b"second");
    assert_eq!(engine.summary().overflows, 2);
}

#[test]
fn test_run_stops_when_every_root_is_invalidated() {
    let fx = fixture();
    let mut source = ScriptedSource::default();
    source.batches.push_back(vec![
        event(fx.left.parent().unwrap(), "A", EventKind::Delete),
        WatchSignal::Invalidated(fx.left.clone()),
    ]);
    source
        .batches
        .push_back(vec![WatchSignal::Invalidated(fx.right.clone())]);
    source
        .batches
        .push_back(vec![event(&fx.left, "never.txt", EventKind::Create)]);
    let (mut engine, _mirror) = start(&fx, source);

    let summary = engine.run();

    assert_eq!(summary.invalidated, 2);
    assert_eq!(summary.events, 0);
    assert_eq!(summary.mismatches, 0);
    assert!(engine.registry().is_empty());
    assert_eq!(engine.source().batches.len(), 1);
}

#[test]
fn test_run_stops_when_source_closes() {
    let fx = fixture();
    let mut source = ScriptedSource::default();
    source.batches.push_back(vec![
        WatchSignal::Rejected(SyncError::UnsupportedEventKind("Other".to_string())),
    ]);
    let (mut engine, _mirror) = start(&fx, source);

    let summary = engine.run();

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.invalidated, 0);
}

#[test]
fn test_non_recursive_mode_watches_roots_only() {
    let mut fx = fixture();
    fs::create_dir(fx.left.join("sub")).unwrap();
    fx.config.recursive = false;
    let (mut engine, _mirror) = start(&fx, ScriptedSource::default());

    assert_eq!(engine.source().watched.len(), 2);

    fs::create_dir(fx.left.join("made")).unwrap();
    engine.handle(event(&fx.left, "made", EventKind::Create));
    assert!(engine.wait_idle(IDLE));

    assert!(fx.right.join("made").is_dir());
    assert!(!engine.source().watched.contains(&fx.left.join("made")));
}
