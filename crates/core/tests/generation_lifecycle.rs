//! Generation lifecycle integration tests.
//!
//! These tests drive the generator through its handle with mock transport
//! and renderer:
//! - Full artifact generation for a fresh commit
//! - Resuming a partially generated commit
//! - Dropped jobs on fetch failure
//! - Worker pool resizing, stop and restart
//! - Author filtering

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use timelapse_core::{
    pipeline::{
        ArtifactKind, Dependencies, Generator, GeneratorHandle, PipelineConfig, PipelineEvent,
        Stage,
    },
    testing::{fixtures, MockPersistence, MockRenderer, MockTransport},
    transport::canvas_url,
    GenerationConfig, Persistence, PipelineError, SqlitePersistence,
};

/// Test helper wiring a generator to mocks and a temp output directory.
struct TestHarness {
    handle: GeneratorHandle,
    join: tokio::task::JoinHandle<()>,
    persistence: MockPersistence,
    transport: MockTransport,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let persistence = MockPersistence::new();
        let transport = MockTransport::new();
        let deps = Dependencies::new(
            Arc::new(persistence.clone()),
            Arc::new(transport.clone()),
            Arc::new(MockRenderer::new()),
        );
        let (handle, join) =
            Generator::spawn(PipelineConfig::default().with_stats_interval_ms(20), deps);

        Self {
            handle,
            join,
            persistence,
            transport,
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("out")
    }

    fn write_log(&self, name: &str, entries: &[String]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, entries.concat()).expect("Failed to write commit log");
        path
    }

    fn config(&self, commit_log: &Path) -> GenerationConfig {
        fixtures::generation_config(commit_log, &self.output_dir())
    }

    async fn serve_commit(&self, hash: &str) {
        self.transport
            .add_snapshot(
                fixtures::DOWNLOAD_BASE,
                hash,
                &fixtures::metadata(),
                fixtures::canvas(),
                &fixtures::placers(),
            )
            .await;
        self.transport.add_user(fixtures::GAME_SERVER, 7, "zekiah").await;
        self.transport.add_user(fixtures::GAME_SERVER, 9, "placer9").await;
    }

    async fn shutdown(self) {
        self.handle.shutdown().unwrap();
        self.join.await.unwrap();
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

async fn next_event(
    events: &mut broadcast::Receiver<PipelineEvent>,
    predicate: impl Fn(&PipelineEvent) -> bool,
) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_fresh_commit_produces_all_artifacts() {
    let h = TestHarness::new();
    h.serve_commit("abc123").await;
    let log = h.write_log(
        "commits.txt",
        &[fixtures::commit_log_entry("abc123", None, 1704298864)],
    );

    h.handle.start_generation(h.config(&log)).unwrap();
    wait_until(|| h.persistence.record_count() == 6).await;

    let commit_id = h.persistence.commit_id("abc123").unwrap();
    let mut kinds = h.persistence.recorded_kinds(commit_id);
    kinds.sort_by_key(|k| k.code());
    assert_eq!(kinds, ArtifactKind::ALL.to_vec());

    for kind in ArtifactKind::ALL {
        assert_eq!(files_in(&h.output_dir().join(kind.dir_name())), 1, "{}", kind);
    }
    let canvas_render = h
        .output_dir()
        .join("canvas_renders/2024-01-03T16:21:04Z_1_abc123.png");
    assert!(canvas_render.is_file());

    wait_until(|| h.handle.stats().completed_artifacts == 6).await;
    let stats = h.handle.stats();
    assert!(stats.running);
    assert_eq!(stats.ingested_commits, 1);
    assert_eq!(h.persistence.metadata_records().len(), 2);

    h.shutdown().await;
}

#[tokio::test]
async fn test_partially_saved_commit_resumes() {
    let h = TestHarness::new();
    h.serve_commit("def456").await;
    h.persistence.mark_saved(1, ArtifactKind::CanvasDownload);
    h.persistence.mark_saved(1, ArtifactKind::CanvasRender);
    let log = h.write_log(
        "commits.txt",
        &[fixtures::commit_log_entry("def456", None, 1704298900)],
    );

    h.handle.start_generation(h.config(&log)).unwrap();
    wait_until(|| h.persistence.record_count() == 4).await;
    // Let any stray jobs settle
    tokio::time::sleep(Duration::from_millis(100)).await;

    let kinds = h.persistence.recorded_kinds(1);
    assert_eq!(kinds.len(), 4);
    assert!(!kinds.contains(&ArtifactKind::CanvasDownload));
    assert!(!kinds.contains(&ArtifactKind::CanvasRender));
    assert_eq!(
        h.transport
            .request_count(&canvas_url(fixtures::DOWNLOAD_BASE, "def456"))
            .await,
        0
    );

    h.shutdown().await;
}

#[tokio::test]
async fn test_failed_fetch_drops_jobs() {
    let h = TestHarness::new();
    let mut events = h.handle.subscribe();
    let log = h.write_log(
        "commits.txt",
        &[fixtures::commit_log_entry("abc123", None, 1704298864)],
    );

    h.handle.start_generation(h.config(&log)).unwrap();

    for _ in 0..2 {
        let event = next_event(&mut events, |e| matches!(e, PipelineEvent::JobFailed { .. })).await;
        match event {
            PipelineEvent::JobFailed {
                stage, error_kind, ..
            } => {
                assert_eq!(stage, Stage::Download);
                assert_eq!(error_kind, "fetch");
            }
            _ => unreachable!(),
        }
    }

    // Only the date render needs no download
    wait_until(|| h.persistence.record_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.persistence.recorded_kinds(1),
        vec![ArtifactKind::DateRender]
    );
    assert!(h.persistence.metadata_records().is_empty());

    h.shutdown().await;
}

#[tokio::test]
async fn test_workers_added_and_removed_lifo() {
    let h = TestHarness::new();
    let log = h.write_log("commits.txt", &[]);

    h.handle.start_generation(h.config(&log)).unwrap();
    wait_until(|| h.handle.is_running()).await;

    h.handle.add_workers(Stage::Render, 2).unwrap();
    wait_until(|| h.handle.pool_snapshot(Stage::Render).len() == 4).await;
    let ids: Vec<usize> = h
        .handle
        .pool_snapshot(Stage::Render)
        .iter()
        .map(|w| w.worker_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    h.handle.remove_workers(Stage::Render, 1).unwrap();
    wait_until(|| h.handle.pool_snapshot(Stage::Render).len() == 3).await;
    h.handle.remove_workers(Stage::Render, 1).unwrap();
    wait_until(|| h.handle.pool_snapshot(Stage::Render).len() == 2).await;
    let ids: Vec<usize> = h
        .handle
        .pool_snapshot(Stage::Render)
        .iter()
        .map(|w| w.worker_id)
        .collect();
    assert_eq!(ids, vec![1, 2]);

    assert!(matches!(
        h.handle.remove_workers(Stage::Save, 2),
        Err(PipelineError::PoolUnderflow { stage: Stage::Save })
    ));

    h.shutdown().await;
}

#[tokio::test]
async fn test_restart_skips_generated_commits() {
    let h = TestHarness::new();
    h.serve_commit("abc123").await;
    let log = h.write_log(
        "commits.txt",
        &[fixtures::commit_log_entry("abc123", None, 1704298864)],
    );
    let mut events = h.handle.subscribe();

    h.handle.start_generation(h.config(&log)).unwrap();
    wait_until(|| h.persistence.record_count() == 6).await;
    h.handle.stop_generation().unwrap();
    next_event(&mut events, |e| {
        matches!(e, PipelineEvent::GenerationStopped { run_id: 1, .. })
    })
    .await;
    let requests = h.transport.requests().await.len();

    h.handle.start_generation(h.config(&log)).unwrap();
    next_event(&mut events, |e| {
        matches!(e, PipelineEvent::IngestFinished { run_id: 2, records: 1 })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.handle.stats().run_id, Some(2));
    assert_eq!(h.persistence.record_count(), 6);
    assert_eq!(h.transport.requests().await.len(), requests);

    h.shutdown().await;
}

#[tokio::test]
async fn test_author_filter_limits_ingest() {
    let h = TestHarness::new();
    h.serve_commit("def456").await;
    let log = h.write_log(
        "commits.txt",
        &[
            fixtures::commit_log_entry("abc123", Some("bot"), 1704298864),
            fixtures::commit_log_entry("def456", Some("zekiah"), 1704298900),
        ],
    );
    let mut config = h.config(&log);
    config.allowed_authors = vec!["zekiah".to_string()];
    let mut events = h.handle.subscribe();

    h.handle.start_generation(config).unwrap();
    next_event(&mut events, |e| {
        matches!(e, PipelineEvent::IngestFinished { records: 1, .. })
    })
    .await;

    assert!(h.persistence.commit_id("abc123").is_none());
    wait_until(|| h.persistence.record_count() == 6).await;

    h.shutdown().await;
}

#[tokio::test]
async fn test_sqlite_persistence_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let persistence =
        Arc::new(SqlitePersistence::new(&temp_dir.path().join("timelapse.db")).unwrap());
    let transport = MockTransport::new();
    transport
        .add_snapshot(
            fixtures::DOWNLOAD_BASE,
            "abc123",
            &fixtures::metadata(),
            fixtures::canvas(),
            &fixtures::placers(),
        )
        .await;
    transport.add_user(fixtures::GAME_SERVER, 7, "zekiah").await;
    transport.add_user(fixtures::GAME_SERVER, 9, "placer9").await;

    let log = temp_dir.path().join("commits.txt");
    std::fs::write(&log, fixtures::commit_log_entry("abc123", None, 1704298864)).unwrap();
    let (handle, join) = Generator::spawn(
        PipelineConfig::default(),
        Dependencies::new(
            Arc::clone(&persistence) as Arc<dyn Persistence>,
            Arc::new(transport),
            Arc::new(MockRenderer::new()),
        ),
    );

    handle
        .start_generation(fixtures::generation_config(&log, &temp_dir.path().join("out")))
        .unwrap();
    wait_until(|| persistence.count_artifacts().unwrap() == 6).await;

    let path = persistence
        .artifact_path(1, ArtifactKind::TopPlacersRender)
        .unwrap()
        .unwrap();
    assert!(path.is_file());
    assert_eq!(
        persistence.canvas_metadata(1).unwrap(),
        Some(fixtures::metadata())
    );

    handle.shutdown().unwrap();
    join.await.unwrap();
}
