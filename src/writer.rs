//! JPEG persistence of adjusted frames.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use log::debug;

use crate::error::{CameraError, Result};
use crate::frame::{Frame, PixelLayout};

/// Destination for adjusted frames.
pub trait FrameSink {
    /// Persist `frame` as sequence number `index`, returning where it went.
    fn write(&mut self, frame: &Frame, index: u32) -> Result<PathBuf>;
}

/// Path of frame `index` inside `dir`: `frame_0007.jpg`.
pub fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("frame_{index:04}.jpg"))
}

/// Encode `frame` as a JPEG in memory. Luma frames become grayscale JPEGs.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> image::ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(&mut buf, frame, quality)?;
    Ok(buf)
}

fn encode_into<W: Write>(out: W, frame: &Frame, quality: u8) -> image::ImageResult<()> {
    let color = match frame.layout {
        PixelLayout::Rgb => ExtendedColorType::Rgb8,
        PixelLayout::Luma => ExtendedColorType::L8,
    };
    JpegEncoder::new_with_quality(out, quality).encode(
        &frame.data,
        frame.width,
        frame.height,
        color,
    )
}

/// Writes `frame_NNNN.jpg` files into one directory.
#[derive(Debug)]
pub struct JpegWriter {
    dir: PathBuf,
    quality: u8,
    dir_ready: bool,
}

impl JpegWriter {
    /// Writer targeting `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality,
            dir_ready: false,
        }
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&mut self) -> Result<()> {
        if !self.dir_ready {
            fs::create_dir_all(&self.dir).map_err(|source| CameraError::IoFailure {
                path: self.dir.clone(),
                source,
            })?;
            self.dir_ready = true;
        }
        Ok(())
    }
}

impl FrameSink for JpegWriter {
    fn write(&mut self, frame: &Frame, index: u32) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = frame_path(&self.dir, index);
        write_staged(&path, |out| {
            encode_into(out, frame, self.quality).map_err(io::Error::other)
        })
        .map_err(|source| CameraError::IoFailure {
            path: path.clone(),
            source,
        })?;

        debug!("wrote {}", path.display());
        Ok(path)
    }
}

/// Write `path` through a `.partial` sibling renamed into place on success,
/// so a failed write never leaves a truncated file under the final name.
fn write_staged<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let staging = path.with_extension("jpg.partial");
    let result = File::create(&staging)
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            fill(&mut out)?;
            out.flush()
        })
        .and_then(|()| fs::rename(&staging, path));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

/// Write already encoded JPEG bytes to the next free `frame_NNNN.jpg`.
pub fn write_encoded(dir: &Path, jpeg: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| CameraError::IoFailure {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = frame_path(dir, next_free_index(dir)?);
    write_staged(&path, |out| out.write_all(jpeg)).map_err(|source| CameraError::IoFailure {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Index after the highest existing `frame_NNNN.jpg` in `dir`, or 0.
pub fn next_free_index(dir: &Path) -> Result<u32> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let highest = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            name.strip_prefix("frame_")?
                .strip_suffix(".jpg")?
                .parse::<u32>()
                .ok()
        })
        .max();
    Ok(highest.map_or(0, |index| index.saturating_add(1)))
}
