use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slotvisor::{
    Config, Render, RenderError, RenderRequest, RenderedArtifact, ResyncError, RuntimeError,
    Supervisor,
};

/// Scripted outcome of one render call.
#[derive(Clone, Copy)]
enum Step {
    Ok,
    Fail,
}

/// Fake renderer: per-program scripts, a fixed delay, concurrency bookkeeping.
struct FakeRenderer {
    out_dir: PathBuf,
    delay: Duration,
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
    active: Mutex<HashMap<String, usize>>,
    max_active_per_program: AtomicUsize,
}

impl FakeRenderer {
    fn new(out_dir: &Path, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            out_dir: out_dir.to_path_buf(),
            delay,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            max_active_per_program: AtomicUsize::new(0),
        })
    }

    fn script(&self, program: &str, steps: &[Step]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(program.to_string(), steps.to_vec());
    }

    fn calls(&self, program: &str) -> usize {
        self.calls.lock().unwrap().get(program).copied().unwrap_or(0)
    }

    fn enter(&self, program: &str) {
        let mut active = self.active.lock().unwrap();
        let n = active.entry(program.to_string()).or_insert(0);
        *n += 1;
        self.max_active_per_program.fetch_max(*n, Ordering::SeqCst);
    }

    fn leave(&self, program: &str) {
        let mut active = self.active.lock().unwrap();
        if let Some(n) = active.get_mut(program) {
            *n -= 1;
        }
    }
}

#[async_trait]
impl Render for FakeRenderer {
    async fn render(&self, req: &RenderRequest) -> Result<RenderedArtifact, RenderError> {
        let name = req.program.to_string();
        self.enter(&name);
        tokio::time::sleep(self.delay).await;
        self.leave(&name);

        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(name.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let step = {
            let scripts = self.scripts.lock().unwrap();
            scripts
                .get(&name)
                .and_then(|s| s.get(call - 1).or(s.last()).copied())
                .unwrap_or(Step::Ok)
        };
        match step {
            Step::Ok => {
                let mut file = tempfile::NamedTempFile::new_in(&self.out_dir).unwrap();
                std::io::Write::write_all(&mut file, name.as_bytes()).unwrap();
                Ok(RenderedArtifact::new(file.into_temp_path()))
            }
            Step::Fail => Err(RenderError::EmptyOutput {
                stdout: String::new(),
                stderr: format!("{name} failed on call {call}"),
            }),
        }
    }
}

struct Fixture {
    _work: tempfile::TempDir,
    base: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let work = tempfile::tempdir().unwrap();
        let base = work.path().to_path_buf();
        for dir in ["star_programs_cache", "gifs", "temp", "fake-out"] {
            std::fs::create_dir_all(base.join(dir)).unwrap();
        }
        Self { _work: work, base }
    }

    fn config(&self) -> Config {
        Config {
            retry_delay: Duration::from_millis(200),
            grace: Duration::from_secs(2),
            ..Config::default()
        }
        .rooted_at(&self.base)
    }

    fn source(&self, name: &str) {
        let path = self.base.join("star_programs_cache").join(name);
        std::fs::write(path, "def main(): pass").unwrap();
    }

    fn document(&self, doc: &str) {
        std::fs::write(
            self.base.join("star_programs_cache/program_metadata.json"),
            doc,
        )
        .unwrap();
    }

    fn slot_file(&self, slot: u32) -> PathBuf {
        self.base.join("gifs").join(format!("slot{slot}.gif"))
    }

    fn renderer(&self, delay: Duration) -> Arc<FakeRenderer> {
        FakeRenderer::new(&self.base.join("fake-out"), delay)
    }

    fn supervisor(&self, renderer: Arc<FakeRenderer>) -> Arc<Supervisor> {
        Supervisor::builder(self.config()).with_renderer(renderer).build()
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn owners(report: &[slotvisor::SlotAssignment]) -> Vec<(u32, String)> {
    report
        .iter()
        .map(|a| (a.slot, a.program.to_string()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ordered_allocation_and_stale_slot_reclaim() {
    let fx = Fixture::new();
    fx.source("a.star");
    fx.source("b.star");
    fx.source("c.star");
    fx.document(
        r#"{
            "a.star": { "enabled": true, "order": 1 },
            "b.star": { "enabled": true, "order": 0 },
            "c.star": { "enabled": false }
        }"#,
    );
    std::fs::write(fx.slot_file(2), b"left over").unwrap();

    let renderer = fx.renderer(Duration::from_millis(10));
    let sup = fx.supervisor(renderer.clone());
    let report = sup.resync().await.unwrap();

    assert_eq!(report.generation, 1);
    assert_eq!(
        owners(&report.assignments),
        vec![(0, "b.star".to_string()), (1, "a.star".to_string())]
    );
    assert_eq!(report.stale_removed, vec![2]);
    assert!(!fx.slot_file(2).exists());

    eventually("both slots published", || async {
        sup.read_slot(0).await.unwrap().as_deref() == Some(&b"b.star"[..])
            && sup.read_slot(1).await.unwrap().as_deref() == Some(&b"a.star"[..])
    })
    .await;
    assert!(!fx.slot_file(2).exists());
    assert_eq!(renderer.calls("c.star"), 0);

    // Shrinking the set reclaims the tail.
    fx.document(r#"{ "a.star": { "enabled": true } }"#);
    let report = sup.resync().await.unwrap();
    assert_eq!(owners(&report.assignments), vec![(0, "a.star".to_string())]);
    assert_eq!(report.stale_removed, vec![1]);
    assert_eq!(sup.assignments().await.len(), 1);

    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_render_clears_slot_until_next_success() {
    let fx = Fixture::new();
    fx.source("a.star");
    fx.document(r#"{ "a.star": { "enabled": true, "refresh_rate": 1 } }"#);

    let renderer = fx.renderer(Duration::from_millis(10));
    renderer.script("a.star", &[Step::Ok, Step::Fail, Step::Ok]);
    let sup = fx.supervisor(renderer.clone());
    sup.resync().await.unwrap();

    eventually("first publish", || async { fx.slot_file(0).exists() }).await;
    eventually("slot cleared after failure", || async { !fx.slot_file(0).exists() }).await;

    let failures = sup.failures().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].program, "a.star");
    assert_eq!(failures[0].cause, "render_empty");
    assert!(failures[0].stderr.contains("call 2"));

    eventually("republished after retry", || async { fx.slot_file(0).exists() }).await;
    assert!(renderer.calls("a.star") >= 3);

    let status = sup.status().await;
    assert_eq!(status.programs.len(), 1);
    assert_eq!(status.programs[0].program, "a.star");

    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_coalesce_into_one_follow_up() {
    let fx = Fixture::new();
    fx.source("a.star");
    fx.source("b.star");
    fx.document(r#"{ "a.star": { "enabled": true }, "b.star": { "enabled": true } }"#);

    // Slow renders keep the teardown step of every resync busy.
    let renderer = fx.renderer(Duration::from_millis(300));
    let sup = fx.supervisor(renderer.clone());
    let first = sup.resync().await.unwrap();
    assert_eq!(first.generation, 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let results = futures::future::join_all((0..8).map(|_| sup.resync())).await;

    let mut generations: Vec<u64> = results
        .into_iter()
        .map(|r| r.unwrap().generation)
        .collect();
    generations.sort_unstable();
    generations.dedup();
    assert!(generations.len() <= 2, "runs: {generations:?}");
    assert!(sup.generation() <= 3);

    // Loops of consecutive generations never overlap.
    assert_eq!(renderer.max_active_per_program.load(Ordering::SeqCst), 1);

    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_document_runs_empty_generation() {
    let fx = Fixture::new();
    fx.source("a.star");
    fx.document(r#"{ "a.star": { "enabled": true } }"#);

    let renderer = fx.renderer(Duration::from_millis(10));
    let sup = fx.supervisor(renderer);
    sup.resync().await.unwrap();
    eventually("published", || async { fx.slot_file(0).exists() }).await;

    fx.document("{ not json");
    let err = sup.resync().await.unwrap_err();
    assert!(matches!(err, ResyncError::Config { .. }));
    assert_eq!(err.as_label(), "config_parse");

    assert!(sup.assignments().await.is_empty());
    assert!(!fx.slot_file(0).exists());
    assert_eq!(sup.generation(), 2);

    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_everything_and_closes_resync() {
    let fx = Fixture::new();
    fx.source("a.star");
    fx.document(r#"{ "a.star": { "enabled": true } }"#);

    let sup = fx.supervisor(fx.renderer(Duration::from_millis(10)));
    sup.resync().await.unwrap();

    sup.shutdown().await.unwrap();
    assert!(sup.assignments().await.is_empty());
    assert!(matches!(sup.resync().await, Err(ResyncError::Closed)));
    assert!(sup.request_resync("manual").is_err());

    // Second call is a no-op.
    sup.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_reports_loops_stuck_past_grace() {
    let fx = Fixture::new();
    fx.source("slow.star");
    fx.document(r#"{ "slow.star": { "enabled": true } }"#);

    let cfg = Config {
        grace: Duration::from_millis(200),
        ..fx.config()
    };
    let sup = Supervisor::builder(cfg)
        .with_renderer(fx.renderer(Duration::from_secs(10)))
        .build();
    sup.resync().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let err = sup.shutdown().await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    let RuntimeError::GraceExceeded { grace, stuck } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(grace, Duration::from_millis(200));
    assert_eq!(stuck, vec!["slow.star".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_during_teardown_aborts_the_old_generation() {
    let fx = Fixture::new();
    fx.source("a.star");
    fx.document(r#"{ "a.star": { "enabled": true } }"#);

    let cfg = Config {
        grace: Duration::from_millis(200),
        ..fx.config()
    };
    let renderer = fx.renderer(Duration::from_secs(2));
    let sup = Supervisor::builder(cfg).with_renderer(renderer.clone()).build();
    sup.resync().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The follow-up resync blocks on the in-flight render while tearing down.
    sup.request_resync("manual").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = sup.shutdown().await.unwrap_err();
    let RuntimeError::GraceExceeded { stuck, .. } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(stuck, vec!["a.star".to_string()]);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(renderer.calls("a.star"), 0);
    assert!(!fx.slot_file(0).exists());
}
