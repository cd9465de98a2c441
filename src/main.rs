use std::io::{self, Write};
use tracing::Level;
use usbspeed::config::BenchmarkConfig;
use usbspeed::discovery::list_usb_devices;
use usbspeed::error::user_message;
use usbspeed::shell::{format_device_list, parse_selection, render_outcome, run_speedtest, Selection};
use usbspeed::{DeviceRecord, APP_NAME};

fn prompt(text: &str) -> io::Result<Option<String>> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input))
}

fn refresh_devices() -> Vec<DeviceRecord> {
    match list_usb_devices() {
        Ok(devices) => devices,
        Err(err) => {
            println!("{}", user_message(&err));
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::WARN)
        .with_target(false)
        .init();

    println!("{} {}", APP_NAME, env!("CARGO_PKG_VERSION"));
    let config = BenchmarkConfig::default();
    let mut devices = refresh_devices();

    loop {
        println!("\n{}", format_device_list(&devices));
        let Some(input) = prompt("Select a device number, 'r' to refresh, 'q' to quit: ")? else {
            break;
        };

        let device = match parse_selection(&input, devices.len()) {
            Selection::Quit => break,
            Selection::Refresh => {
                devices = refresh_devices();
                continue;
            }
            Selection::Device(index) => devices.get(index),
            Selection::Invalid => None,
        };

        if let Some(device) = device {
            println!("Testing {} ...", device.display_name());
        }
        let outcome = run_speedtest(config.clone(), device).await;
        println!("{}", render_outcome(&outcome));
    }

    Ok(())
}
