//! Job script rendering
//!
//! Two scripts are produced per configuration:
//! - Capture: grabs one frame from the device into `image_<timestamp>.jpg`
//! - Compilation: encodes every `image_*.jpg` into `timelapse.mp4`
//!
//! Both embed the output directory as a quoted literal so they run the same
//! regardless of the scheduler's working directory or environment.

use std::fmt::Write;
use std::path::Path;

use crate::quality::QualityTier;
use crate::shell::quote;

/// Program invoked by the capture script
pub const CAPTURE_PROGRAM: &str = "fswebcam";

/// Program invoked by the compilation script
pub const ENCODER_PROGRAM: &str = "ffmpeg";

/// File name of the generated capture script
pub const CAPTURE_SCRIPT_NAME: &str = "capture_image.sh";

/// File name of the generated compilation script
pub const TIMELAPSE_SCRIPT_NAME: &str = "create_timelapse.sh";

/// `date` format stamped into each frame name; sorts lexicographically
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Glob matching every frame written by the capture script
pub const IMAGE_GLOB: &str = "image_*.jpg";

/// Compiled video, overwritten on every run
pub const OUTPUT_VIDEO: &str = "timelapse.mp4";

/// Framerate of the compiled video
pub const OUTPUT_FPS: u32 = 25;

const SHEBANG: &str = "#!/bin/bash";

/// Render the capture script.
///
/// Each run writes exactly one frame to `<output_dir>/image_YYYYMMDD_HHMMSS.jpg`.
pub fn render_capture_script(output_dir: &Path, quality: QualityTier, device: &str) -> String {
    let mut s = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(s, "{}", SHEBANG);
    let _ = writeln!(s, "DIR={}", quote(&output_dir.to_string_lossy()));
    let _ = writeln!(s, "DATE=$(date +\"{}\")", TIMESTAMP_FORMAT);
    let _ = writeln!(
        s,
        "{} --resolution {} -d {} \"$DIR/image_$DATE.jpg\"",
        CAPTURE_PROGRAM,
        quality.resolution_arg(),
        quote(device),
    );
    s
}

/// Render the daily compilation script.
pub fn render_timelapse_script(output_dir: &Path) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "{}", SHEBANG);
    let _ = writeln!(s, "DIR={}", quote(&output_dir.to_string_lossy()));
    let _ = writeln!(s, "cd \"$DIR\" || exit 1");
    let _ = writeln!(
        s,
        "{} -y -framerate {} -pattern_type glob -i {} -c:v libx264 -pix_fmt yuv420p {}",
        ENCODER_PROGRAM,
        OUTPUT_FPS,
        quote(IMAGE_GLOB),
        OUTPUT_VIDEO,
    );
    s
}
