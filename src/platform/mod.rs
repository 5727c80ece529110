//! Platform abstraction layer
//!
//! A run talks to its host through an [`OutputSink`]: a status stream of
//! text lines and the finished images of raster observers.
//! - [`MemorySink`]: keeps everything in memory (tests, embedding)
//! - [`FileSink`]: prints lines and writes graymaps to a directory (CLI)
//! - `web`: posts lines to a worker callback and paints an `OffscreenCanvas`

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::observer::Pgm;

#[cfg(target_arch = "wasm32")]
pub mod web;

/// `Send` on native targets, where a run may move to a worker thread.
/// Browser handles are tied to their thread, so wasm drops the bound.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send> MaybeSend for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSend for T {}

/// Where a run sends its status lines and finished rasters
pub trait OutputSink: MaybeSend {
    fn log(&mut self, line: &str);

    /// Deliver the finished image of the observer writing `name`
    fn raster(&mut self, name: &str, image: &Pgm) -> Result<(), Error>;
}

#[derive(Debug, Default)]
struct Captured {
    lines: Vec<String>,
    rasters: BTreeMap<String, Pgm>,
}

/// Sink that records everything it receives
///
/// Clones share the same storage, so a test can keep one handle while the
/// simulation owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    captured: Arc<Mutex<Captured>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn captured(&self) -> MutexGuard<'_, Captured> {
        // a panicking writer cannot leave the vectors half-updated
        self.captured.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn logged(&self) -> Vec<String> {
        self.captured().lines.clone()
    }

    /// Names of the rasters delivered so far, sorted
    pub fn images(&self) -> Vec<String> {
        self.captured().rasters.keys().cloned().collect()
    }

    pub fn image(&self, name: &str) -> Option<Pgm> {
        self.captured().rasters.get(name).cloned()
    }
}

impl OutputSink for MemorySink {
    fn log(&mut self, line: &str) {
        self.captured().lines.push(line.to_string());
    }

    fn raster(&mut self, name: &str, image: &Pgm) -> Result<(), Error> {
        self.captured().rasters.insert(name.to_string(), image.clone());
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::FileSink;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;

    use log::info;

    use super::OutputSink;
    use crate::error::Error;
    use crate::observer::Pgm;

    /// Sink for the command line: lines go to stdout, images to `dir`
    #[derive(Debug, Clone)]
    pub struct FileSink {
        dir: PathBuf,
        quiet: bool,
    }

    impl FileSink {
        pub fn new(dir: impl Into<PathBuf>, quiet: bool) -> Self {
            Self {
                dir: dir.into(),
                quiet,
            }
        }

        /// File an image named `name` is written to
        pub fn path_for(&self, name: &str) -> PathBuf {
            let mut path = self.dir.join(name);
            if path.extension().is_none() {
                path.set_extension("pgm");
            }
            path
        }
    }

    impl OutputSink for FileSink {
        fn log(&mut self, line: &str) {
            if !self.quiet {
                println!("{line}");
            }
        }

        fn raster(&mut self, name: &str, image: &Pgm) -> Result<(), Error> {
            let path = self.path_for(name);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(&path)?);
            image.write_to(&mut out)?;
            out.flush()?;
            info!("wrote {}x{} image to {}", image.width, image.height, path.display());
            Ok(())
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PgmFormat;

    #[test]
    fn test_memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        handle.log("hello");
        let image = Pgm {
            width: 1,
            height: 1,
            format: PgmFormat::Ascii,
            pixels: vec![7],
        };
        handle.raster("b", &image).unwrap();
        handle.raster("a", &image).unwrap();
        assert_eq!(sink.logged(), vec!["hello".to_string()]);
        assert_eq!(sink.images(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(sink.image("a"), Some(image));
    }

    #[test]
    fn test_memory_sink_is_shared_across_threads() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        std::thread::spawn(move || handle.log("from worker")).join().unwrap();
        assert_eq!(sink.logged(), vec!["from worker".to_string()]);
    }
}
