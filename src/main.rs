//! Capture frames from a V4L2 webcam and write them out as JPEG files

use std::path::PathBuf;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn};

use webcam_capture::{compress, pipeline, utils, Config, Error, Session};

/// Consecutive frames `compress` may reject before the capture gives up.
const MAX_DROPPED_FRAMES: u32 = 8;

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter("webcam_capture=debug")
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Webcam capture launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Auto-detect capture device if needed
    let (device, format) = if config.capture.device.is_empty() {
        let found = utils::auto_detect_device()
            .ok_or_else(|| eyre!("No suitable capture device found"))?;
        (found.path, found.format)
    } else {
        (PathBuf::from(&config.capture.device), config.capture.format)
    };
    info!("Using capture device: {} ({format})", device.display());

    let mut session = Session::open(&device)?;
    let (width, height) = (config.capture.width, config.capture.height);
    if !session
        .supported_frame_sizes(format)
        .iter()
        .any(|size| size.contains(width, height))
    {
        warn!("{width}x{height} is not offered for {format}; the driver will pick the nearest size");
    }
    let negotiated = session.set_image_format(format, width, height)?;
    if !pipeline::can_compress(negotiated.format) {
        return Err(eyre!("Device settled on {}, which cannot be compressed", negotiated.format));
    }
    session.set_buffer_count(config.capture.buffer_count)?;
    if let Err(err) = session.set_auto_white_balance(true) {
        warn!("Auto white balance unavailable: {err}");
    }

    std::fs::create_dir_all(&config.encode.output_dir)?;
    let options = config.encode.options();
    let timeout = Duration::from_millis(config.capture.wait_timeout_ms);

    session.start_streaming()?;
    let mut written = 0;
    let mut dropped = 0;
    while written < config.capture.frames {
        match session.wait_for_frame(timeout) {
            Ok(()) => {}
            Err(Error::Timeout) => {
                warn!("No frame within {timeout:?}");
                continue;
            }
            Err(err) => {
                error!("Wait failed: {err}");
                break;
            }
        }

        let Some(frame) = session.get_frame()? else {
            continue;
        };
        let index = frame.index;
        let compressed = compress(
            frame.data,
            negotiated.format,
            negotiated.width,
            negotiated.height,
            &options,
        );
        session.release_frame(index)?;

        match compressed {
            Ok(out) => {
                let path = config.encode.output_dir.join(format!("frame-{written:04}.jpg"));
                std::fs::write(&path, &out.data)?;
                info!("{} -> {}", out.diagnostic, path.display());
                written += 1;
                dropped = 0;
            }
            Err(err) => {
                error!("Dropping frame {index}: {err}");
                dropped += 1;
                if dropped >= MAX_DROPPED_FRAMES {
                    error!("Giving up after {dropped} frames in a row failed to compress");
                    break;
                }
            }
        }
    }

    session.stop_streaming()?;
    session.close()?;

    info!("Webcam capture shutting down");
    Ok(())
}
