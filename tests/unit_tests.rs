use sampled_load::{
    CounterSource, DecayFactors, LoadAverager, LoadError, LoadSnapshot, MiscStat, QueueCounter,
    Result, RunState, SamplerConfig, UtilizationSource, SAMPLING_PERIOD,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

/// Counter source whose readings are scripted by the test.
///
/// Counts how many times it was opened so tests can observe sampler starts.
struct ScriptedSource {
    opens: Arc<AtomicUsize>,
    open_error: Option<LoadError>,
    readings: Arc<Mutex<VecDeque<Result<f64>>>>,
}

struct ScriptedCounter {
    readings: Arc<Mutex<VecDeque<Result<f64>>>>,
}

impl ScriptedSource {
    fn new(readings: Vec<Result<f64>>) -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            open_error: None,
            readings: Arc::new(Mutex::new(readings.into())),
        }
    }

    fn failing(err: LoadError) -> Self {
        Self {
            open_error: Some(err),
            ..Self::new(Vec::new())
        }
    }

    fn opens(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }
}

impl CounterSource for ScriptedSource {
    type Counter = ScriptedCounter;

    fn open(self) -> Result<ScriptedCounter> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.open_error {
            Some(err) => Err(err),
            None => Ok(ScriptedCounter {
                readings: self.readings,
            }),
        }
    }
}

impl QueueCounter for ScriptedCounter {
    fn read(&mut self) -> Result<f64> {
        // Once the script runs out the queue holds steady at one thread.
        self.readings.lock().unwrap().pop_front().unwrap_or(Ok(1.0))
    }
}

/// Utilization fallback returning scripted fractions, then failing.
struct ScriptedFallback(VecDeque<f64>);

impl UtilizationSource for ScriptedFallback {
    fn utilization(&mut self) -> Result<f64> {
        self.0
            .pop_front()
            .ok_or_else(|| LoadError::fallback_error("script exhausted"))
    }
}

fn no_fallback() -> ScriptedFallback {
    ScriptedFallback(VecDeque::new())
}

fn factors() -> DecayFactors {
    DecayFactors::for_period(SAMPLING_PERIOD)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// Test that readings follow the EWMA recurrence tick by tick
#[tokio::test(start_paused = true)]
async fn test_ewma_recurrence_through_sampler() {
    let samples = [2.0, 5.0, 1.0, 3.0];
    let source = ScriptedSource::new(samples.iter().copied().map(Ok).collect());
    let averager = LoadAverager::new(source, no_fallback());
    let cancel = CancellationToken::new();
    let f = factors();

    let mut expected = LoadSnapshot::ZERO;
    for sample in samples {
        let reading = assert_ok!(averager.next_avg(&cancel).await);
        assert_eq!(reading.error, None);

        expected = LoadSnapshot {
            load1: expected.load1 * f.one + sample * (1.0 - f.one),
            load5: expected.load5 * f.five + sample * (1.0 - f.five),
            load15: expected.load15 * f.fifteen + sample * (1.0 - f.fifteen),
        };
        assert_close(reading.value.load1, expected.load1);
        assert_close(reading.value.load5, expected.load5);
        assert_close(reading.value.load15, expected.load15);
    }
}

/// Test that the first call returns zeros without waiting for a sample
#[tokio::test(start_paused = true)]
async fn test_avg_before_first_tick_is_zero() {
    let averager = LoadAverager::new(ScriptedSource::new(vec![Ok(4.0)]), no_fallback());

    let reading = averager.avg();
    assert_eq!(reading.value, LoadSnapshot::ZERO);
    assert_eq!(reading.error, None);
}

/// Test that reads between ticks are bitwise identical
#[tokio::test(start_paused = true)]
async fn test_idempotent_read() {
    let averager = LoadAverager::new(ScriptedSource::new(vec![Ok(0.7)]), no_fallback());
    assert_ok!(averager.next_avg(&CancellationToken::new()).await);

    let first = averager.avg().value;
    let second = averager.avg().value;
    assert_eq!(first.load1.to_bits(), second.load1.to_bits());
    assert_eq!(first.load5.to_bits(), second.load5.to_bits());
    assert_eq!(first.load15.to_bits(), second.load15.to_bits());
}

/// Test that concurrent first calls start exactly one sampler
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_start_under_contention() {
    let source = ScriptedSource::new(Vec::new());
    let opens = source.opens();
    let averager = Arc::new(LoadAverager::new(source, no_fallback()));
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let averager = Arc::clone(&averager);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            averager.avg()
        }));
    }
    for handle in handles {
        handle.await.expect("Task should not panic");
    }

    assert_ok!(averager.next_avg(&CancellationToken::new()).await);
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(averager.run_state(), RunState::Running);
    averager.shutdown();
}

/// Test that racing threads outside any runtime also start one sampler
#[test]
fn test_single_start_from_plain_threads() {
    let source = ScriptedSource::new(Vec::new());
    let opens = source.opens();
    let config = SamplerConfig::default()
        .with_dedicated_thread(true)
        .with_thread_name("contention-sampler");
    let averager = Arc::new(LoadAverager::with_config(source, no_fallback(), config).unwrap());
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let averager = Arc::clone(&averager);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                averager.avg();
            })
        })
        .collect();
    for thread in threads {
        thread.join().expect("Thread should not panic");
    }

    // The counter is opened by the winning caller before avg() returns.
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    averager.shutdown();
}

/// Test the zero reading bootstrap end to end
#[tokio::test(start_paused = true)]
async fn test_zero_bootstrap_seeds_once() {
    let source = ScriptedSource::new(vec![Ok(0.0), Ok(0.0)]);
    let fallback = ScriptedFallback(VecDeque::from(vec![0.4, 0.8]));
    let averager = LoadAverager::new(source, fallback);
    let cancel = CancellationToken::new();
    let f = factors();

    let first = assert_ok!(averager.next_avg(&cancel).await).value;
    assert_close(first.load1, 0.4);
    assert_close(first.load5, 0.2 * f.five + 0.4 * (1.0 - f.five));
    assert_close(first.load15, 0.4 / 3.0 * f.fifteen + 0.4 * (1.0 - f.fifteen));

    let second = assert_ok!(averager.next_avg(&cancel).await).value;
    assert_close(second.load1, first.load1 * f.one + 0.8 * (1.0 - f.one));
    assert_close(second.load5, first.load5 * f.five + 0.8 * (1.0 - f.five));
    assert_close(second.load15, first.load15 * f.fifteen + 0.8 * (1.0 - f.fifteen));
}

/// Test that a failed open freezes the snapshot and repeats the error
#[tokio::test(start_paused = true)]
async fn test_permanent_init_failure() {
    let init_error = LoadError::source_init_error("counter not found");
    let source = ScriptedSource::failing(init_error.clone());
    let opens = source.opens();
    let averager = LoadAverager::new(source, no_fallback());
    let cancel = CancellationToken::new();

    let reading = assert_ok!(averager.next_avg(&cancel).await);
    assert_eq!(reading.value, LoadSnapshot::ZERO);
    assert_eq!(reading.error, Some(init_error.clone()));

    // Halted samplers answer waits immediately.
    let reading = assert_ok!(averager.next_avg(&cancel).await);
    assert_eq!(reading.error, Some(init_error.clone()));

    tokio::time::sleep(SAMPLING_PERIOD * 10).await;
    for _ in 0..5 {
        let reading = averager.avg();
        assert_eq!(reading.value, LoadSnapshot::ZERO);
        assert_eq!(reading.error, Some(init_error.clone()));
    }
    assert_eq!(opens.load(Ordering::SeqCst), 1);
}

/// Test that the very first avg() already carries the open failure
#[test]
fn test_init_failure_visible_on_first_avg() {
    let init_error = LoadError::source_init_error("no counter");

    for config in [
        SamplerConfig::default(),
        SamplerConfig::default().with_dedicated_thread(true),
    ] {
        let source = ScriptedSource::failing(init_error.clone());
        let averager = LoadAverager::with_config(source, no_fallback(), config).unwrap();

        let reading = averager.avg();
        assert_eq!(reading.value, LoadSnapshot::ZERO);
        assert_eq!(reading.error, Some(init_error.clone()));
        assert_eq!(reading.into_result(), Err(init_error.clone()));
    }
}

/// Test that the first avg() inside a runtime also carries the open failure
#[tokio::test(start_paused = true)]
async fn test_init_failure_visible_on_first_avg_in_runtime() {
    let init_error = LoadError::source_init_error("no counter");
    let averager = LoadAverager::new(ScriptedSource::failing(init_error.clone()), no_fallback());

    assert_eq!(averager.avg().into_result(), Err(init_error));
}

/// Test that a sampler dropped with its runtime reports itself stopped
#[test]
fn test_runtime_shutdown_is_reported() {
    let averager = LoadAverager::new(ScriptedSource::new(Vec::new()), no_fallback());

    let first = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    first.block_on(async {
        assert_eq!(averager.avg().error, None);
    });
    drop(first);

    let reading = averager.avg();
    assert_eq!(reading.value, LoadSnapshot::ZERO);
    assert!(matches!(reading.error, Some(LoadError::Stopped(_))));

    let second = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let waited = second.block_on(async {
        tokio::time::timeout(
            Duration::from_secs(1),
            averager.next_avg(&CancellationToken::new()),
        )
        .await
    });
    let reading = assert_ok!(assert_ok!(waited));
    assert!(matches!(reading.error, Some(LoadError::Stopped(_))));
}

/// Test that a runtime shut down after some ticks keeps the last snapshot
#[test]
fn test_runtime_shutdown_keeps_last_snapshot() {
    let averager = LoadAverager::new(ScriptedSource::new(vec![Ok(3.0)]), no_fallback());

    let first = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let sampled = first
        .block_on(averager.next_avg(&CancellationToken::new()))
        .unwrap();
    drop(first);

    let reading = averager.avg();
    assert_eq!(reading.value, sampled.value);
    assert!(reading.value.load1 > 0.0);
    assert!(matches!(reading.error, Some(LoadError::Stopped(_))));
}

/// Counter that records which thread performed each read.
struct ThreadRecordingSource(Arc<Mutex<Vec<std::thread::ThreadId>>>);

impl CounterSource for ThreadRecordingSource {
    type Counter = ThreadRecordingSource;

    fn open(self) -> Result<Self> {
        Ok(self)
    }
}

impl QueueCounter for ThreadRecordingSource {
    fn read(&mut self) -> Result<f64> {
        self.0.lock().unwrap().push(std::thread::current().id());
        Ok(1.0)
    }
}

/// Test that counter reads stay off the runtime thread
#[tokio::test]
async fn test_reads_run_off_the_runtime_thread() {
    let readers = Arc::new(Mutex::new(Vec::new()));
    let averager = LoadAverager::new(ThreadRecordingSource(Arc::clone(&readers)), no_fallback());

    let reading = assert_ok!(averager.next_avg(&CancellationToken::new()).await);
    assert_eq!(reading.error, None);

    let runtime_thread = std::thread::current().id();
    let readers = readers.lock().unwrap();
    assert!(!readers.is_empty());
    assert!(readers.iter().all(|id| *id != runtime_thread));
}

/// Test that a single failed read is reported and then cleared
#[tokio::test(start_paused = true)]
async fn test_transient_read_failure_recovery() {
    let read_error = LoadError::source_read_error("counter busy");
    let source = ScriptedSource::new(vec![Ok(2.0), Err(read_error.clone()), Ok(2.0)]);
    let averager = LoadAverager::new(source, no_fallback());
    let cancel = CancellationToken::new();

    let healthy = assert_ok!(averager.next_avg(&cancel).await);
    assert_eq!(healthy.error, None);

    let failed = assert_ok!(averager.next_avg(&cancel).await);
    assert_eq!(failed.error, Some(read_error));
    assert_eq!(failed.value, healthy.value);

    let recovered = assert_ok!(averager.next_avg(&cancel).await);
    assert_eq!(recovered.error, None);
    assert!(recovered.value.load1 > healthy.value.load1);
}

/// Test that misc is always unimplemented
#[tokio::test(start_paused = true)]
async fn test_misc_stub() {
    let averager = LoadAverager::new(ScriptedSource::new(Vec::new()), no_fallback());

    let before = averager.misc();
    assert_eq!(before.value, MiscStat::default());
    assert_eq!(before.error, Some(LoadError::NotImplemented));

    assert_ok!(averager.next_avg(&CancellationToken::new()).await);
    let after = averager.misc();
    assert_eq!(after.error, Some(LoadError::NotImplemented));
    assert_eq!(after.into_result(), Err(LoadError::NotImplemented));

    let global = sampled_load::misc();
    assert_eq!(global.error, Some(LoadError::NotImplemented));
}

/// Test that a cancelled wait returns without a reading
#[tokio::test(start_paused = true)]
async fn test_next_avg_honors_cancellation() {
    let averager = LoadAverager::new(ScriptedSource::new(Vec::new()), no_fallback());
    let cancel = CancellationToken::new();
    assert_ok!(averager.next_avg(&cancel).await);

    cancel.cancel();
    let err = assert_err!(averager.next_avg(&cancel).await);
    assert_eq!(err, LoadError::Cancelled);
}

/// Test that shutdown stops publishing
#[tokio::test(start_paused = true)]
async fn test_shutdown_halts_sampler() {
    let averager = LoadAverager::new(ScriptedSource::new(Vec::new()), no_fallback());
    let cancel = CancellationToken::new();
    let last = assert_ok!(averager.next_avg(&cancel).await);

    averager.shutdown();
    let after = assert_ok!(averager.next_avg(&cancel).await);
    assert_eq!(after.value, last.value);

    tokio::time::sleep(SAMPLING_PERIOD * 4).await;
    assert_eq!(averager.avg().value, last.value);
}

/// Test SamplerConfig serialization
#[test]
fn test_sampler_config_json() {
    let config = SamplerConfig::default().with_zero_bootstrap(false);
    let json = serde_json::to_string(&config).expect("Should serialize");
    assert!(json.contains("\"zero_bootstrap\":false"));

    let parsed: SamplerConfig = serde_json::from_str(&json).expect("Should deserialize");
    assert_eq!(parsed, config);
}

/// Test LoadSnapshot JSON field names
#[test]
fn test_load_snapshot_json() {
    let json = serde_json::to_value(LoadSnapshot::new(1.5, 1.25, 1.0)).expect("Should serialize");
    assert_eq!(json["load1"], 1.5);
    assert_eq!(json["load5"], 1.25);
    assert_eq!(json["load15"], 1.0);
}
