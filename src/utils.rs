use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capture::{PixelFormat, Session};
use crate::pipeline;

/// Number of `/dev/videoN` nodes probed.
const PROBED_NODES: u32 = 10;

// Detected capture device info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: PathBuf,
    pub card: String,
    pub format: PixelFormat,
}

/// Pick a capture format: hardware JPEG first, then YUYV, then anything the
/// pipeline can decode.
pub fn preferred_format(formats: impl IntoIterator<Item = PixelFormat>) -> Option<PixelFormat> {
    let formats: Vec<_> = formats.into_iter().collect();
    [PixelFormat::MJPG, PixelFormat::YUYV]
        .into_iter()
        .find(|preferred| formats.contains(preferred))
        .or_else(|| {
            let mut decodable: Vec<_> = formats
                .iter()
                .copied()
                .filter(|&f| pipeline::is_supported(f))
                .collect();
            decodable.sort();
            decodable.first().copied()
        })
}

fn probe(path: &Path) -> Option<FoundDevice> {
    let session = match Session::open(path) {
        Ok(session) => session,
        Err(err) => {
            debug!("Skipping {}: {err}", path.display());
            return None;
        }
    };

    let card = session.capabilities().card.clone();
    let found = preferred_format(session.supported_formats().into_keys()).map(|format| {
        info!("Found {format} device: {} - {card}", path.display());
        FoundDevice {
            path: path.to_path_buf(),
            card,
            format,
        }
    });

    if let Err(err) = session.close() {
        warn!("Failed to close {} after probing: {err}", path.display());
    }
    found
}

/// Auto-detect best capture device among `/dev/video0..9`
pub fn auto_detect_device() -> Option<FoundDevice> {
    info!("Auto-detecting capture devices...");

    (0..PROBED_NODES)
        .map(|i| PathBuf::from(format!("/dev/video{i}")))
        .filter(|path| path.exists())
        .find_map(|path| probe(&path))
}
