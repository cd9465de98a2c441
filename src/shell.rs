//! Console front end helpers
//!
//! Menu parsing and rendering for the interactive loop in `main.rs`, plus a
//! benchmark runner that drives a progress spinner.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::bench::{ProgressUpdate, ThroughputBenchmark};
use crate::config::BenchmarkConfig;
use crate::error::user_message;
use crate::models::{BenchmarkResult, DeviceRecord};
use crate::{Result, UsbSpeedError};

/// What the operator typed at the device prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Zero-based index into the listed devices
    Device(usize),
    Refresh,
    Quit,
    Invalid,
}

/// Parse a 1-based device number, `r` or `q`
pub fn parse_selection(input: &str, device_count: usize) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") {
        return Selection::Quit;
    }
    if input.eq_ignore_ascii_case("r") {
        return Selection::Refresh;
    }
    match input.parse::<usize>() {
        Ok(n) if n >= 1 && n <= device_count => Selection::Device(n - 1),
        _ => Selection::Invalid,
    }
}

/// Numbered device list
pub fn format_device_list(devices: &[DeviceRecord]) -> String {
    if devices.is_empty() {
        return "No USB storage devices found.".to_string();
    }
    devices
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}: {}", i + 1, d.display_name()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text shown once a run has finished
pub fn render_outcome(outcome: &Result<BenchmarkResult>) -> String {
    match outcome {
        Ok(result) => result.summary(),
        Err(err) => user_message(err),
    }
}

/// Run the throughput test on the selected device and stream progress to a spinner
pub async fn run_speedtest(
    config: BenchmarkConfig,
    device: Option<&DeviceRecord>,
) -> Result<BenchmarkResult> {
    let device = device.ok_or(UsbSpeedError::NoDeviceSelected)?;
    let benchmark = ThroughputBenchmark::new(config)?;

    let (tx, mut rx) = mpsc::channel(100);
    let pb = ProgressBar::new(benchmark.config().total_bytes());
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg:<20} {bytes}/{total_bytes}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let handle = tokio::spawn(async move {
        while let Some(ProgressUpdate {
            state,
            bytes_processed,
            ..
        }) = rx.recv().await
        {
            pb.set_message(state.description());
            pb.set_position(bytes_processed);
            pb.tick();
            if state.is_terminal() {
                break;
            }
        }
        pb.finish_and_clear();
    });

    let result = benchmark.run_with_progress(&device.mount_path, tx).await;
    handle.await.ok();
    result
}
