//! Window-by-window tracking of a whole video.

use super::buffer::FaceTrackingBuffer;
use crate::error::MediaResult;
use crate::metrics;
use crate::output::{ResultWriter, DEFAULT_IMAGE_EXTENSION, DEFAULT_VIDEO_EXTENSION};
use crate::video::VideoSinkFactory;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Totals of a tracking run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSummary {
    /// Frames written, overlapping frames counted once
    pub frames: usize,
    /// Faces detected in the written frames
    pub faces: usize,
    /// Windows processed
    pub windows: usize,
}

/// Drives a [`FaceTrackingBuffer`] over a video and writes its results.
pub struct FaceTracker {
    buffer: FaceTrackingBuffer,
    sinks: Option<Box<dyn VideoSinkFactory>>,
    video_ext: String,
    image_ext: String,
}

impl FaceTracker {
    pub fn new(buffer: FaceTrackingBuffer) -> Self {
        Self {
            buffer,
            sinks: None,
            video_ext: DEFAULT_VIDEO_EXTENSION.to_string(),
            image_ext: DEFAULT_IMAGE_EXTENSION.to_string(),
        }
    }

    pub fn with_video_sinks(mut self, factory: Box<dyn VideoSinkFactory>) -> Self {
        self.sinks = Some(factory);
        self
    }

    pub fn with_extensions(mut self, video_ext: &str, image_ext: &str) -> Self {
        self.video_ext = video_ext.to_string();
        self.image_ext = image_ext.to_string();
        self
    }

    pub fn buffer(&self) -> &FaceTrackingBuffer {
        &self.buffer
    }

    /// Buffer access for loading models and tuning detection.
    pub fn buffer_mut(&mut self) -> &mut FaceTrackingBuffer {
        &mut self.buffer
    }

    /// Track the faces of `video`; outputs are named after `output`.
    ///
    /// Each window is processed in turn: faces, landmarks when a landmark
    /// model is set, persons, then results of the frames not written yet.
    pub fn run(mut self, video: &Path, output: &Path) -> MediaResult<TrackingSummary> {
        self.buffer.open(video)?;
        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let fps = self.buffer.video().framerate();

        let mut writer = ResultWriter::new(self.buffer.options().clone(), output, stem, fps)?
            .with_video_extension(&self.video_ext)?
            .with_image_extension(&self.image_ext)?;
        if let Some(factory) = self.sinks.take() {
            writer = writer.with_video_sinks(factory);
        }

        info!(
            video = %video.display(),
            output = %output.display(),
            fps,
            nframes = self.buffer.video().nframes(),
            "Face tracking started"
        );

        let mut summary = TrackingSummary::default();
        loop {
            let more = self.buffer.next()?;
            let Some((begin, end)) = self.buffer.buffer_range() else {
                break;
            };
            let started = Instant::now();

            self.buffer.detect_faces_buffer()?;
            if self.buffer.has_landmark_detector() {
                self.buffer.detect_landmarks_buffer()?;
            }
            self.buffer.detect_persons_buffer()?;

            let first = writer.last_written().map_or(begin, |last| begin.max(last + 1));
            let mut faces = 0;
            for index in first..=end {
                faces += self.buffer.get_detected_faces(index)?.len();
            }
            let written = writer.write_window(&self.buffer)?;

            summary.frames += written;
            summary.faces += faces;
            summary.windows += 1;
            metrics::record_window(started.elapsed().as_secs_f64());
            info!(begin, end, written, faces, "Processed window");

            if !more {
                break;
            }
        }

        writer.close()?;
        self.buffer.close();
        info!(
            frames = summary.frames,
            faces = summary.faces,
            windows = summary.windows,
            persons = writer.persons().len(),
            "Face tracking finished"
        );
        Ok(summary)
    }
}
