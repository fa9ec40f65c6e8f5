use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::AnalysisError;

/// 逐帧读取的视频源
///
/// `grab` 只前进不解码，`retrieve` 读取当前帧的编码字节；未被抽样的帧只 grab。
#[async_trait]
pub trait VideoSource: Send {
    fn fps(&self) -> f64;

    fn total_frames(&self) -> u64;

    fn grab(&mut self) -> bool;

    async fn retrieve(&mut self) -> Result<Vec<u8>, AnalysisError>;
}

#[async_trait]
pub trait VideoOpener: Send + Sync {
    async fn open(&self, path: &str) -> Result<Box<dyn VideoSource>, AnalysisError>;
}

const FRAME_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct Manifest {
    fps: f64,
}

/// 以目录中的图像序列作为视频：文件按名称排序，帧率取自可选的 `manifest.json`
#[derive(Debug, Clone)]
pub struct ImageSequenceOpener {
    default_fps: f64,
}

impl ImageSequenceOpener {
    pub fn new(default_fps: f64) -> Self {
        Self { default_fps }
    }
}

#[async_trait]
impl VideoOpener for ImageSequenceOpener {
    async fn open(&self, path: &str) -> Result<Box<dyn VideoSource>, AnalysisError> {
        let dir = Path::new(path);
        let cannot_open = |reason: String| AnalysisError::CannotOpen {
            path: path.to_string(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| cannot_open(e.to_string()))?;
        let mut frames = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| cannot_open(e.to_string()))?
        {
            let file = entry.path();
            let is_frame = file
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                frames.push(file);
            }
        }
        if frames.is_empty() {
            return Err(cannot_open("no frames found".to_string()));
        }
        frames.sort();

        let fps = match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(manifest) if manifest.fps > 0.0 => manifest.fps,
                Ok(_) => self.default_fps,
                Err(e) => {
                    tracing::warn!(path, error = %e, "ignoring malformed manifest");
                    self.default_fps
                }
            },
            Err(_) => self.default_fps,
        };

        Ok(Box::new(ImageSequenceSource::new(frames, fps)))
    }
}

pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    fps: f64,
    cursor: Option<usize>,
}

impl ImageSequenceSource {
    pub fn new(frames: Vec<PathBuf>, fps: f64) -> Self {
        Self {
            frames,
            fps,
            cursor: None,
        }
    }
}

#[async_trait]
impl VideoSource for ImageSequenceSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn total_frames(&self) -> u64 {
        self.frames.len() as u64
    }

    fn grab(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.frames.len() {
            self.cursor = Some(self.frames.len());
            return false;
        }
        self.cursor = Some(next);
        true
    }

    async fn retrieve(&mut self) -> Result<Vec<u8>, AnalysisError> {
        let index = self
            .cursor
            .filter(|&c| c < self.frames.len())
            .ok_or(AnalysisError::FrameRead {
                index: 0,
                reason: "no frame grabbed".to_string(),
            })?;
        tokio::fs::read(&self.frames[index])
            .await
            .map_err(|e| AnalysisError::FrameRead {
                index: index as u64,
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) {
        std::fs::write(dir.join(name), bytes).expect("write");
    }

    #[tokio::test]
    async fn frames_are_sorted_and_filtered() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write(tmp.path(), "002.jpg", b"b");
        write(tmp.path(), "001.png", b"a");
        write(tmp.path(), "notes.txt", b"x");

        let mut source = ImageSequenceOpener::new(30.0)
            .open(tmp.path().to_str().unwrap())
            .await
            .expect("open");
        assert_eq!(source.total_frames(), 2);
        assert_eq!(source.fps(), 30.0);

        assert!(source.grab());
        assert_eq!(source.retrieve().await.unwrap(), b"a");
        assert!(source.grab());
        assert_eq!(source.retrieve().await.unwrap(), b"b");
        assert!(!source.grab());
        assert!(source.retrieve().await.is_err());
    }

    #[tokio::test]
    async fn manifest_overrides_fps() {
        let tmp = tempfile::tempdir().expect("tempdir");
        write(tmp.path(), "0.jpg", b"a");
        write(tmp.path(), MANIFEST_FILE, br#"{"fps": 12.5}"#);

        let source = ImageSequenceOpener::new(30.0)
            .open(tmp.path().to_str().unwrap())
            .await
            .expect("open");
        assert_eq!(source.fps(), 12.5);
    }

    #[tokio::test]
    async fn missing_directory_cannot_open() {
        let err = ImageSequenceOpener::new(30.0)
            .open("/definitely/not/here")
            .await
            .err()
            .expect("error");
        assert_eq!(err.to_string(), "Cannot open video file");
    }

    #[tokio::test]
    async fn empty_directory_cannot_open() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = ImageSequenceOpener::new(30.0)
            .open(tmp.path().to_str().unwrap())
            .await
            .err()
            .expect("error");
        assert!(matches!(err, AnalysisError::CannotOpen { .. }));
    }
}
