use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;

/// Decoded RGBA8 normal map, ready for texture upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalMapImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Loads and decodes the water normal map from disk.
pub fn load_normal_map(path: &Path) -> Result<NormalMapImage, AssetError> {
    let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|source| AssetError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();
    Ok(NormalMapImage {
        width: decoded.width(),
        height: decoded.height(),
        rgba: decoded.into_raw(),
    })
}

/// Single-texel straight-up normal, the stand-in sampled until the real
/// map arrives (and the fallback if it never does).
pub fn flat_normal() -> NormalMapImage {
    NormalMapImage {
        width: 1,
        height: 1,
        rgba: vec![128, 128, 255, 255],
    }
}

type LoadSlot = Arc<Mutex<Option<Result<NormalMapImage, AssetError>>>>;

/// Background normal-map load.
///
/// The worker thread decodes the image and parks the result in a shared
/// slot; the render loop polls the slot once per frame and installs the
/// texture when it shows up. Dropping the loader joins the thread, so a
/// pending load cannot outlive the scene that requested it.
pub struct NormalMapLoader {
    slot: LoadSlot,
    worker: Option<JoinHandle<()>>,
    delivered: bool,
}

impl NormalMapLoader {
    pub fn spawn(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let slot: LoadSlot = Arc::new(Mutex::new(None));
        let worker_slot = Arc::clone(&slot);
        let worker = std::thread::spawn(move || {
            let result = load_normal_map(&path);
            match &result {
                Ok(map) => info!(
                    "normal map loaded: {} ({}x{})",
                    path.display(),
                    map.width,
                    map.height
                ),
                Err(err) => warn!("normal map load failed, keeping flat fallback: {err}"),
            }
            *worker_slot.lock() = Some(result);
        });
        Self {
            slot,
            worker: Some(worker),
            delivered: false,
        }
    }

    /// Takes the completed load result, if any. Returns `Some` exactly
    /// once per load.
    pub fn poll(&mut self) -> Option<Result<NormalMapImage, AssetError>> {
        if self.delivered {
            return None;
        }
        let result = self.slot.lock().take();
        if result.is_some() {
            self.delivered = true;
        }
        result
    }

    /// Whether the result has already been handed out.
    pub fn is_delivered(&self) -> bool {
        self.delivered
    }
}

impl Drop for NormalMapLoader {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn write_test_png(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("normals.png");
        let image = RgbaImage::from_pixel(4, 2, Rgba([128, 64, 255, 255]));
        image.save(&path).expect("write png fixture");
        path
    }

    #[test]
    fn decodes_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(&dir);
        let map = load_normal_map(&path).unwrap();
        assert_eq!((map.width, map.height), (4, 2));
        assert_eq!(map.rgba.len(), 4 * 2 * 4);
        assert_eq!(&map.rgba[0..4], &[128, 64, 255, 255]);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_normal_map(Path::new("does/not/exist.png")).unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_normal_map(&path).unwrap_err();
        assert!(matches!(err, AssetError::Decode { .. }));
    }

    #[test]
    fn loader_delivers_result_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_png(&dir);
        let mut loader = NormalMapLoader::spawn(path);
        let result = loop {
            if let Some(result) = loader.poll() {
                break result;
            }
            std::thread::yield_now();
        };
        assert!(result.is_ok());
        assert!(loader.is_delivered());
        assert!(loader.poll().is_none());
    }

    #[test]
    fn fallback_is_a_flat_up_normal() {
        let map = flat_normal();
        assert_eq!((map.width, map.height), (1, 1));
        assert_eq!(map.rgba, vec![128, 128, 255, 255]);
    }
}
