//! Background decoding of user-selected files.
//!
//! Decodes run on worker threads and report back over a channel drained by
//! the render thread. Each request gets a generation number per asset kind;
//! a completion is handed out only if no newer request of the same kind was
//! made since, so a slow decode can never overwrite a newer selection.

use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::audio::{decode_file, DecodedAudio};
use crate::error::Result;

/// What a file is loaded as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Audio,
    Image,
    Watermark,
}

impl AssetKind {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            AssetKind::Audio => 0,
            AssetKind::Image => 1,
            AssetKind::Watermark => 2,
        }
    }

    /// Classify a dropped file by extension (audio or image)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "wav" | "wave" | "mp3" | "flac" | "ogg" | "oga" | "opus" | "m4a" | "mp4" | "aac"
            | "aiff" | "aif" | "caf" | "mkv" | "webm" => Some(AssetKind::Audio),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tif" | "tiff" | "tga" | "ico"
            | "pnm" | "qoi" | "hdr" | "exr" => Some(AssetKind::Image),
            _ => None,
        }
    }
}

/// A decoded asset, fully built and ready to swap in
pub enum LoadedAsset {
    Audio(DecodedAudio),
    Image(RgbaImage),
}

/// Result of one load request
pub struct Completion {
    pub kind: AssetKind,
    pub generation: u64,
    pub path: PathBuf,
    pub result: Result<LoadedAsset>,
}

/// Dispatches decodes to worker threads and filters stale completions
pub struct AssetLoader {
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    latest: [u64; AssetKind::COUNT],
    stale_discards: usize,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            latest: [0; AssetKind::COUNT],
            stale_discards: 0,
        }
    }

    /// Decode `path` in the background as `kind`; returns the request generation
    pub fn request(&mut self, kind: AssetKind, path: PathBuf) -> u64 {
        log::info!("Loading {:?} from {}", kind, path.display());
        match kind {
            AssetKind::Audio => {
                self.spawn(kind, path, |p| decode_file(p).map(LoadedAsset::Audio))
            }
            AssetKind::Image | AssetKind::Watermark => self.spawn(kind, path, |p| {
                Ok(LoadedAsset::Image(image::open(p)?.to_rgba8()))
            }),
        }
    }

    /// Run an arbitrary decode job as the newest request of `kind`
    pub fn spawn<F>(&mut self, kind: AssetKind, path: PathBuf, job: F) -> u64
    where
        F: FnOnce(&Path) -> Result<LoadedAsset> + Send + 'static,
    {
        let slot = &mut self.latest[kind.index()];
        *slot += 1;
        let generation = *slot;
        let sender = self.sender.clone();

        thread::spawn(move || {
            let result = job(&path);
            // Receiver gone means the app is shutting down
            let _ = sender.send(Completion {
                kind,
                generation,
                path,
                result,
            });
        });

        generation
    }

    /// Drain finished jobs without blocking, keeping only current ones
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut ready = Vec::new();
        while let Ok(completion) = self.receiver.try_recv() {
            if self.is_current(&completion) {
                ready.push(completion);
            } else {
                log::info!(
                    "Discarding stale {:?} load of {} (generation {})",
                    completion.kind,
                    completion.path.display(),
                    completion.generation
                );
                self.stale_discards += 1;
            }
        }
        ready
    }

    /// Whether `completion` answers the newest request of its kind
    pub fn is_current(&self, completion: &Completion) -> bool {
        self.latest[completion.kind.index()] == completion.generation
    }

    /// Completions dropped because a newer request superseded them
    pub fn stale_discards(&self) -> usize {
        self.stale_discards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for<F: FnMut(&mut AssetLoader, &mut Vec<Completion>) -> bool>(
        loader: &mut AssetLoader,
        mut done: F,
    ) -> Vec<Completion> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = Vec::new();
        while Instant::now() < deadline {
            got.extend(loader.poll());
            if done(loader, &mut got) {
                return got;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("loader did not finish in time");
    }

    fn tiny_image(width: u32) -> Result<LoadedAsset> {
        Ok(LoadedAsset::Image(RgbaImage::new(width, 1)))
    }

    #[test]
    fn test_classify_extensions() {
        assert_eq!(AssetKind::from_path(Path::new("a/song.MP3")), Some(AssetKind::Audio));
        assert_eq!(AssetKind::from_path(Path::new("cover.png")), Some(AssetKind::Image));
        assert_eq!(AssetKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(AssetKind::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn test_completion_delivered() {
        let mut loader = AssetLoader::new();
        let generation = loader.spawn(AssetKind::Image, "a.png".into(), |_| tiny_image(3));

        let got = wait_for(&mut loader, |_, got| !got.is_empty());
        assert_eq!(got[0].generation, generation);
        assert!(matches!(got[0].result, Ok(LoadedAsset::Image(ref img)) if img.width() == 3));
    }

    #[test]
    fn test_stale_completion_discarded() {
        let mut loader = AssetLoader::new();
        let (release, gate) = mpsc::channel::<()>();

        // First request blocks until the second has been delivered
        let first = loader.spawn(AssetKind::Image, "slow.png".into(), move |_| {
            let _ = gate.recv();
            tiny_image(1)
        });
        let second = loader.spawn(AssetKind::Image, "fast.png".into(), |_| tiny_image(2));
        assert!(second > first);

        let got = wait_for(&mut loader, |_, got| !got.is_empty());
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].generation, second);

        release.send(()).unwrap();
        let late = wait_for(&mut loader, |l, _| l.stale_discards() == 1);
        assert!(late.is_empty());
    }

    #[test]
    fn test_kinds_are_independent() {
        let mut loader = AssetLoader::new();
        loader.spawn(AssetKind::Image, "a.png".into(), |_| tiny_image(1));
        loader.spawn(AssetKind::Watermark, "logo.png".into(), |_| tiny_image(1));

        let got = wait_for(&mut loader, |_, got| got.len() == 2);
        assert_eq!(loader.stale_discards(), 0);
        assert!(got.iter().any(|c| c.kind == AssetKind::Watermark));
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let mut loader = AssetLoader::new();
        loader.request(AssetKind::Image, "/nonexistent/picture.png".into());

        let got = wait_for(&mut loader, |_, got| !got.is_empty());
        assert!(got[0].result.is_err());
    }
}
