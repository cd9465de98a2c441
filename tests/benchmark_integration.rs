use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use usbspeed::bench::{BenchmarkState, ProgressUpdate};
use usbspeed::io::MemoryVolumeIo;
use usbspeed::{measure_throughput, BenchmarkConfig, ThroughputBenchmark};

#[tokio::test]
async fn test_full_run_on_temp_volume() {
    let temp_dir = tempfile::tempdir().unwrap();
    let result = measure_throughput(temp_dir.path()).await.unwrap();

    assert!(result.is_valid());
    assert_eq!(result.bytes_per_phase, 10 * 1024 * 1024);
    assert!(result.summary().starts_with("Write speed: "));
    assert!(!temp_dir.path().join("testfile.dat").exists());
}

#[tokio::test]
async fn test_back_to_back_runs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bench = ThroughputBenchmark::new(
        BenchmarkConfig::new().with_block_size(256 * 1024).with_iterations(4),
    )
    .unwrap();

    for _ in 0..3 {
        assert!(bench.run(temp_dir.path()).await.unwrap().is_valid());
    }
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_progress_reaches_full_phase() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bench = ThroughputBenchmark::new(
        BenchmarkConfig::new().with_block_size(64 * 1024).with_iterations(8),
    )
    .unwrap();
    let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(128);

    bench.run_with_progress(temp_dir.path(), tx).await.unwrap();

    let mut updates = Vec::new();
    while let Some(update) = rx.recv().await {
        updates.push(update);
    }
    let last_write = updates
        .iter()
        .filter(|u| u.state == BenchmarkState::WritingFile)
        .last()
        .unwrap();
    assert_eq!(last_write.completion_percentage(), 1.0);
    assert_eq!(updates.last().unwrap().state, BenchmarkState::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_fifty_eighty() {
    let volume = MemoryVolumeIo::new().with_write_rate(50.0).with_read_rate(80.0);
    let bench = ThroughputBenchmark::with_io(BenchmarkConfig::default(), Arc::new(volume.clone()))
        .unwrap();

    let result = bench.run(Path::new("E:\\")).await.unwrap();
    assert!((45.0..=55.0).contains(&result.write_speed_mbps));
    assert!((72.0..=88.0).contains(&result.read_speed_mbps));
    assert!(result.write_elapsed >= Duration::from_millis(190));
}
