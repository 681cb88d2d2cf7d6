//! Idle throttling observed through the public analyzer API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sdrscan::{
    Analyzer, ConsumerEvent, ConsumerId, ConsumerState, ScanConfig, ScanContext, SourceParams,
    TaskContext, TaskError, TaskStatus,
};

fn analyzer(idle_cycles: u32) -> Analyzer {
    let config = ScanConfig::from_toml_str(&format!(
        "[consumer]\nwindow_len = 512\nidle_cycles = {idle_cycles}\n[workers]\nthreads = 2"
    ))
    .unwrap();
    Analyzer::new(ScanContext::init(&config).unwrap(), &config).unwrap()
}

fn tonegen(analyzer: &Analyzer) -> ConsumerId {
    let params = SourceParams {
        sample_rate: 1e6,
        seed: Some(3),
        ..SourceParams::default()
    };
    let source = analyzer.open_source("tonegen", &params).unwrap();
    analyzer.attach_consumer(source).unwrap()
}

fn wait_stopped(analyzer: &Analyzer, id: ConsumerId) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if let Some(ConsumerEvent::Stopped { consumer }) = analyzer.next_event(Duration::from_millis(100)) {
            if consumer == id {
                return;
            }
        }
    }
    panic!("{id} never stopped");
}

#[test]
fn no_reads_until_first_task() {
    let analyzer = analyzer(30);
    let id = tonegen(&analyzer);
    std::thread::sleep(Duration::from_millis(50));

    let consumer = analyzer.consumer(id).unwrap();
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(consumer.stats().windows_read, 0);
    assert_eq!(consumer.buffer_len(), 0);
}

#[test]
fn reads_idle_cycles_after_last_task_then_stops() {
    let analyzer = analyzer(30);
    let id = tonegen(&analyzer);
    let consumer = analyzer.consumer(id).unwrap();

    analyzer
        .push_task(id, Box::new(|_: &TaskContext| Ok(TaskStatus::Done)))
        .unwrap();
    wait_stopped(&analyzer, id);

    let stats = consumer.stats();
    assert_eq!(stats.idle_reads, 30);
    assert!(stats.windows_read >= 31);
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(consumer.outstanding(), 0);

    // Stays stopped without tasks.
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(consumer.stats().windows_read, stats.windows_read);
}

#[test]
fn new_task_restarts_a_stopped_consumer() {
    let analyzer = analyzer(4);
    let id = tonegen(&analyzer);
    let consumer = analyzer.consumer(id).unwrap();

    analyzer
        .push_task(id, Box::new(|_: &TaskContext| Ok(TaskStatus::Done)))
        .unwrap();
    wait_stopped(&analyzer, id);
    let first = consumer.stats();
    assert_eq!(first.idle_reads, 4);

    let seen = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&seen);
    analyzer
        .push_task(
            id,
            Box::new(move |ctx: &TaskContext| -> Result<TaskStatus, TaskError> {
                assert!(ctx.window().position() >= first.samples_read);
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 10 {
                    Ok(TaskStatus::Done)
                } else {
                    Ok(TaskStatus::Continue)
                }
            }),
        )
        .unwrap();
    wait_stopped(&analyzer, id);

    assert_eq!(seen.load(Ordering::SeqCst), 10);
    let second = consumer.stats();
    assert_eq!(second.idle_reads, 8);
    assert!(second.windows_read >= first.windows_read + 10 + 4);
}

#[test]
fn windows_are_contiguous_in_stream_order() {
    let analyzer = analyzer(1);
    let id = tonegen(&analyzer);
    let consumer = analyzer.consumer(id).unwrap();

    let next = Arc::new(AtomicU64::new(0));
    let expected = Arc::clone(&next);
    analyzer
        .push_task(
            id,
            Box::new(move |ctx: &TaskContext| -> Result<TaskStatus, TaskError> {
                let window = ctx.window();
                // Busy tasks skip windows, so positions only move forward.
                let prev = expected.swap(window.end(), Ordering::SeqCst);
                assert!(window.position() >= prev);
                assert_eq!(window.position() % 512, 0);
                Ok(if window.end() >= 512 * 64 {
                    TaskStatus::Done
                } else {
                    TaskStatus::Continue
                })
            }),
        )
        .unwrap();
    wait_stopped(&analyzer, id);

    assert!(next.load(Ordering::SeqCst) >= 512 * 64);
    assert!(analyzer.failed_consumers().is_empty());
    assert!(!consumer.is_failed());
}
