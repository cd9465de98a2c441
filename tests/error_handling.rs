use usbspeed::error::user_message;
use usbspeed::io::{PlatformVolumeIo, TestFile, VolumeIo};
use usbspeed::shell::{parse_selection, run_speedtest, Selection};
use usbspeed::{measure_throughput, BenchmarkConfig, DeviceRecord, ThroughputBenchmark, UsbSpeedError};

#[tokio::test]
async fn test_invalid_selection_never_reaches_the_device() {
    let temp_dir = tempfile::tempdir().unwrap();
    let devices = vec![DeviceRecord::new("/dev/sdb", "usb-stick", "Stick", temp_dir.path())];

    let device = match parse_selection("7", devices.len()) {
        Selection::Device(index) => devices.get(index),
        _ => None,
    };
    assert!(device.is_none());

    let err = run_speedtest(BenchmarkConfig::default(), device).await.unwrap_err();
    assert!(matches!(err, UsbSpeedError::NoDeviceSelected));
    assert_eq!(user_message(&err), "Please select a device for testing.");
}

#[tokio::test]
async fn test_missing_volume_reports_os_text() {
    let temp_dir = tempfile::tempdir().unwrap();
    let bench = ThroughputBenchmark::new(BenchmarkConfig::default()).unwrap();

    let err = bench
        .run(&temp_dir.path().join("unplugged"))
        .await
        .unwrap_err();
    let text = user_message(&err);
    assert!(text.starts_with("File access error: Failed to create test file"));
    assert!(text.contains("testfile.dat"));
}

#[tokio::test]
async fn test_stale_test_file_does_not_block_later_runs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let stale = temp_dir.path().join("testfile.dat");
    std::fs::write(&stale, vec![0u8; 16]).unwrap();

    for _ in 0..3 {
        let result = measure_throughput(temp_dir.path()).await.unwrap();
        assert!(result.is_valid());
        assert!(!stale.exists());
    }
}

#[cfg(any(unix, windows))]
#[tokio::test]
async fn test_test_file_held_under_lock_is_refused() {
    let temp_dir = tempfile::tempdir().unwrap();
    let held = temp_dir.path().join("testfile.dat");
    let volume = PlatformVolumeIo::new();
    let mut owner = volume.create_exclusive(&held).await.unwrap();
    owner.write_block(&[7u8; 16]).await.unwrap();
    owner.flush().await.unwrap();

    let bench = ThroughputBenchmark::new(BenchmarkConfig::default()).unwrap();
    let err = bench.run(temp_dir.path()).await.unwrap_err();
    assert!(err.is_file_locked());
    assert!(user_message(&err).contains("Another test may be running"));

    owner.close().await.unwrap();
    assert_eq!(std::fs::read(&held).unwrap(), vec![7u8; 16]);
}

#[test]
fn test_bad_config_is_rejected_up_front() {
    let config = BenchmarkConfig::default().with_test_file_name("../escape.dat");
    let err = ThroughputBenchmark::new(config).err().unwrap();
    assert!(matches!(err, UsbSpeedError::Config(_)));
    assert!(err.to_string().contains("plain file name"));
}
