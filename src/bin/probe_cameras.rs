//! Probe-cameras binary: report which local cameras open and deliver frames.

use std::time::Duration;

use webcam_capture::{CaptureConfig, DeviceId, Session};

const PROBED_DEVICES: u32 = 4;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut found = 0;
    for index in 0..PROBED_DEVICES {
        let config = CaptureConfig {
            device: DeviceId::Local(index),
            settle_delay: Duration::ZERO,
            warmup_frames: 0,
            ..CaptureConfig::default()
        };
        print!("{}: ", config.device);

        let mut session = match Session::open(&config) {
            Ok(session) => session,
            Err(err) => {
                println!("unavailable ({err})");
                continue;
            }
        };
        found += 1;

        let caps = session.capabilities();
        print!("{} ({}), ", caps.card, caps.driver);
        let format = session.format().clone();
        match session.read() {
            Ok(frame) => println!(
                "{}x{} {} OK, read {}x{} frame",
                format.width, format.height, format.fourcc, frame.width, frame.height
            ),
            Err(err) => println!(
                "{}x{} {} opened, but reading failed: {err}",
                format.width, format.height, format.fourcc
            ),
        }
        for warning in session.degraded() {
            println!("    degraded: {warning}");
        }
        session.close();
    }

    if found == 0 {
        println!("No working cameras found.");
        std::process::exit(1);
    }
}
