//! Decoded video frame sources.

use crate::error::{MediaError, MediaResult};
use image::RgbImage;
use std::path::Path;

/// A decoder yielding RGB frames sequentially.
///
/// Implementations own exactly one decoder handle.
pub trait VideoReader: Send {
    /// Open a video file, replacing any previously opened one.
    fn open(&mut self, path: &Path) -> MediaResult<()>;

    fn is_opened(&self) -> bool;

    /// Decode the next frame, `None` at end of stream.
    fn read_frame(&mut self) -> MediaResult<Option<RgbImage>>;

    /// Decode up to `n` frames.
    fn read(&mut self, n: usize) -> MediaResult<Vec<RgbImage>> {
        let mut frames = Vec::with_capacity(n);
        while frames.len() < n {
            match self.read_frame()? {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        Ok(frames)
    }

    /// Position the decoder so the next frame read is `frame`.
    fn seek(&mut self, frame: usize) -> MediaResult<()>;

    /// Index of the next frame to be read.
    fn tell(&self) -> usize;

    fn framerate(&self) -> f64;

    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Total number of frames announced by the container.
    fn nframes(&self) -> usize;

    /// Release the decoder.
    fn close(&mut self);
}

/// Frame source over already decoded images.
///
/// Used to track faces in image sequences and to drive the pipeline without
/// a codec.
#[derive(Debug, Clone)]
pub struct MemoryVideoReader {
    frames: Vec<RgbImage>,
    framerate: f64,
    position: usize,
    opened: bool,
}

impl MemoryVideoReader {
    pub fn new(frames: Vec<RgbImage>, framerate: f64) -> Self {
        Self {
            frames,
            framerate,
            position: 0,
            opened: false,
        }
    }
}

impl VideoReader for MemoryVideoReader {
    fn open(&mut self, path: &Path) -> MediaResult<()> {
        if self.frames.is_empty() {
            return Err(MediaError::video_read(format!(
                "{}: no frames available",
                path.display()
            )));
        }
        self.position = 0;
        self.opened = true;
        Ok(())
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn read_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if !self.opened {
            return Ok(None);
        }
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, frame: usize) -> MediaResult<()> {
        if frame > self.frames.len() {
            return Err(MediaError::video_read(format!(
                "cannot seek to frame {} of {}",
                frame,
                self.frames.len()
            )));
        }
        self.position = frame;
        Ok(())
    }

    fn tell(&self) -> usize {
        self.position
    }

    fn framerate(&self) -> f64 {
        self.framerate
    }

    fn width(&self) -> u32 {
        self.frames.first().map(|f| f.width()).unwrap_or(0)
    }

    fn height(&self) -> u32 {
        self.frames.first().map(|f| f.height()).unwrap_or(0)
    }

    fn nframes(&self) -> usize {
        self.frames.len()
    }

    fn close(&mut self) {
        self.opened = false;
        self.position = 0;
    }
}

#[cfg(feature = "opencv")]
pub use self::cv::OpencvVideoReader;

#[cfg(feature = "opencv")]
mod cv {
    use super::VideoReader;
    use crate::error::{MediaError, MediaResult};
    use crate::image_utils::mat::mat_to_rgb_image;
    use image::RgbImage;
    use opencv::{
        core::Mat,
        prelude::*,
        videoio::{
            VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
            CAP_PROP_FRAME_WIDTH, CAP_PROP_POS_FRAMES,
        },
    };
    use std::path::Path;
    use tracing::{debug, info};

    /// Video decoder backed by `cv::VideoCapture`.
    #[derive(Default)]
    pub struct OpencvVideoReader {
        capture: Option<VideoCapture>,
        position: usize,
        framerate: f64,
        width: u32,
        height: u32,
        nframes: usize,
    }

    impl OpencvVideoReader {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl VideoReader for OpencvVideoReader {
        fn open(&mut self, path: &Path) -> MediaResult<()> {
            self.close();
            if !path.exists() {
                return Err(MediaError::FileNotFound(path.to_path_buf()));
            }
            let path_str = path.to_string_lossy();
            let capture = VideoCapture::from_file(&path_str, CAP_ANY)
                .map_err(|e| MediaError::video_read(format!("{}: {}", path.display(), e)))?;
            if !capture.is_opened().unwrap_or(false) {
                return Err(MediaError::video_read(format!(
                    "{}: decoder could not open file",
                    path.display()
                )));
            }

            self.framerate = capture.get(CAP_PROP_FPS).unwrap_or(0.0);
            self.width = capture.get(CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
            self.height = capture.get(CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
            self.nframes = capture.get(CAP_PROP_FRAME_COUNT).unwrap_or(0.0).max(0.0) as usize;
            self.position = 0;
            self.capture = Some(capture);

            info!(
                path = %path.display(),
                width = self.width,
                height = self.height,
                fps = self.framerate,
                frames = self.nframes,
                "Opened video"
            );
            Ok(())
        }

        fn is_opened(&self) -> bool {
            self.capture.is_some()
        }

        fn read_frame(&mut self) -> MediaResult<Option<RgbImage>> {
            let Some(capture) = self.capture.as_mut() else {
                return Ok(None);
            };
            let mut frame = Mat::default();
            if !capture.read(&mut frame).unwrap_or(false) || frame.empty() {
                return Ok(None);
            }
            self.position += 1;
            mat_to_rgb_image(&frame).map(Some)
        }

        fn seek(&mut self, frame: usize) -> MediaResult<()> {
            let capture = self
                .capture
                .as_mut()
                .ok_or_else(|| MediaError::video_read("seek on a closed video"))?;
            capture
                .set(CAP_PROP_POS_FRAMES, frame as f64)
                .map_err(|e| MediaError::video_read(format!("seek to frame {frame}: {e}")))?;
            self.position = frame;
            debug!(frame, "Seeked video");
            Ok(())
        }

        fn tell(&self) -> usize {
            self.position
        }

        fn framerate(&self) -> f64 {
            self.framerate
        }

        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn nframes(&self) -> usize {
            self.nframes
        }

        fn close(&mut self) {
            if let Some(mut capture) = self.capture.take() {
                let _ = capture.release();
                debug!("Released video decoder");
            }
            self.position = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frames(n: u8) -> Vec<RgbImage> {
        (0..n).map(|i| RgbImage::from_pixel(4, 3, Rgb([i, 0, 0]))).collect()
    }

    #[test]
    fn test_memory_reader_reads_sequentially() {
        let mut reader = MemoryVideoReader::new(frames(5), 25.0);
        assert!(reader.read_frame().unwrap().is_none());
        reader.open(Path::new("memory")).unwrap();
        assert_eq!((reader.width(), reader.height(), reader.nframes()), (4, 3, 5));

        let batch = reader.read(3).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(reader.tell(), 3);
        assert_eq!(reader.read(10).unwrap().len(), 2);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_memory_reader_seek() {
        let mut reader = MemoryVideoReader::new(frames(5), 25.0);
        reader.open(Path::new("memory")).unwrap();
        reader.seek(4).unwrap();
        assert_eq!(reader.read_frame().unwrap().unwrap().get_pixel(0, 0)[0], 4);
        assert!(reader.seek(6).is_err());
    }

    #[test]
    fn test_memory_reader_empty_fails_to_open() {
        let mut reader = MemoryVideoReader::new(Vec::new(), 25.0);
        assert!(matches!(
            reader.open(Path::new("empty")),
            Err(MediaError::VideoRead(_))
        ));
    }
}
