//! Fan-out of tracking results to CSV, videos and image folders.

use super::csv::{image_name, CsvWriter};
use super::tagging::{person_color, tag_image};
use crate::error::{MediaError, MediaResult};
use crate::image_utils::{blank, crop, is_image_extension, resize, save_image};
use crate::tracking::{anonymous_identity, FaceTrackingBuffer, Landmarks, PersonLabel};
use crate::video::{fourcc_for_extension, VideoSink, VideoSinkFactory};
use facetrack_models::{BoundingBox, FaceTrackingOptions};
use image::RgbImage;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_VIDEO_EXTENSION: &str = "mp4";
pub const DEFAULT_IMAGE_EXTENSION: &str = "png";

/// `base` with `suffix` appended to its last component.
fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = base.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

struct PersonVideo {
    sink: Box<dyn VideoSink>,
    size: (u32, u32),
    /// Last frame counter written to this video
    written: usize,
}

/// Writes the results of each frame to the outputs enabled by the options.
///
/// Per frame the order is fixed: persons registry, CSV, videos, folders.
pub struct ResultWriter {
    options: FaceTrackingOptions,
    base: PathBuf,
    stem: String,
    video_ext: String,
    image_ext: String,
    fps: f64,
    sinks: Option<Box<dyn VideoSinkFactory>>,

    csv: Option<CsvWriter>,
    tag_video: Option<Box<dyn VideoSink>>,
    person_videos: BTreeMap<String, PersonVideo>,
    persons: Vec<String>,
    frames_written: usize,
    last_written: Option<usize>,
    closed: bool,
}

impl ResultWriter {
    /// Writer for outputs named after `base`.
    ///
    /// `stem` names the frames (`<stem>_000042`) and `fps` is the framerate
    /// of produced videos.
    pub fn new(
        options: FaceTrackingOptions,
        base: impl Into<PathBuf>,
        stem: impl Into<String>,
        fps: f64,
    ) -> MediaResult<Self> {
        options.validate()?;
        let base = base.into();
        let csv = if options.csv {
            Some(CsvWriter::open(&with_suffix(&base, ".csv"))?)
        } else {
            None
        };
        Ok(Self {
            options,
            base,
            stem: stem.into(),
            video_ext: DEFAULT_VIDEO_EXTENSION.to_string(),
            image_ext: DEFAULT_IMAGE_EXTENSION.to_string(),
            fps,
            sinks: None,
            csv,
            tag_video: None,
            person_videos: BTreeMap::new(),
            persons: Vec::new(),
            frames_written: 0,
            last_written: None,
            closed: false,
        })
    }

    pub fn with_video_sinks(mut self, factory: Box<dyn VideoSinkFactory>) -> Self {
        self.sinks = Some(factory);
        self
    }

    pub fn with_video_extension(mut self, ext: &str) -> MediaResult<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        fourcc_for_extension(&ext)?;
        self.video_ext = ext;
        Ok(self)
    }

    pub fn with_image_extension(mut self, ext: &str) -> MediaResult<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if !is_image_extension(&ext) {
            return Err(MediaError::UnsupportedFormat(format!("image extension '{ext}'")));
        }
        self.image_ext = ext;
        Ok(self)
    }

    pub fn options(&self) -> &FaceTrackingOptions {
        &self.options
    }

    /// Identities met so far, in order of first sighting.
    pub fn persons(&self) -> &[String] {
        &self.persons
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn last_written(&self) -> Option<usize> {
        self.last_written
    }

    pub fn csv_path(&self) -> PathBuf {
        with_suffix(&self.base, ".csv")
    }

    pub fn tag_video_path(&self) -> PathBuf {
        with_suffix(&self.base, &format!(".{}", self.video_ext))
    }

    pub fn person_video_path(&self, identity: &str) -> PathBuf {
        with_suffix(&self.base, &format!("_{identity}.{}", self.video_ext))
    }

    pub fn tag_image_path(&self, frame_index: usize) -> PathBuf {
        self.base
            .join(format!("{}.{}", image_name(&self.stem, frame_index), self.image_ext))
    }

    pub fn crop_image_path(&self, identity: &str, frame_index: usize) -> PathBuf {
        self.base
            .join(identity)
            .join(format!("{}.{}", image_name(&self.stem, frame_index), self.image_ext))
    }

    /// Write every frame of the buffer's window not written yet.
    ///
    /// Returns the number of frames written.
    pub fn write_window(&mut self, buffer: &FaceTrackingBuffer) -> MediaResult<usize> {
        let Some((begin, end)) = buffer.buffer_range() else {
            return Ok(0);
        };
        let first = match self.last_written {
            Some(last) => begin.max(last + 1),
            None => begin,
        };
        let mut count = 0;
        for index in first..=end {
            self.write_frame(
                index,
                buffer.frame(index)?,
                buffer.get_detected_faces(index)?,
                buffer.get_detected_landmarks(index)?,
                buffer.get_detected_persons(index)?,
            )?;
            count += 1;
        }
        if first > begin {
            debug!(skipped = first - begin, "Skipped frames already written");
        }
        Ok(count)
    }

    /// Write the results of one frame.
    pub fn write_frame(
        &mut self,
        frame_index: usize,
        frame: &RgbImage,
        faces: &[BoundingBox],
        landmarks: &[Landmarks],
        persons: &[Option<PersonLabel>],
    ) -> MediaResult<()> {
        if self.closed {
            return Err(MediaError::internal("write on a closed result writer"));
        }
        let name = image_name(&self.stem, frame_index);

        for label in persons.iter().flatten() {
            if !self.persons.contains(&label.identity) {
                info!(identity = %label.identity, frame = frame_index, "Person first seen");
                self.persons.push(label.identity.clone());
            }
        }

        if let Some(csv) = self.csv.as_mut() {
            csv.write_frame(frame_index, &name, faces, persons, landmarks)?;
        }

        let identities: Vec<String> = (0..faces.len())
            .map(|j| match persons.get(j) {
                Some(Some(label)) => label.identity.clone(),
                _ => anonymous_identity(j),
            })
            .collect();

        let tagged = if self.options.tag && (self.options.video || self.options.folder) {
            let colors: Vec<_> = (0..faces.len())
                .map(|j| match persons.get(j) {
                    Some(Some(label)) => person_color(label.index),
                    _ => person_color(j),
                })
                .collect();
            let image = tag_image(frame, faces, landmarks, &colors);
            Some(match self.options.resize_to() {
                Some(_) => resize(&image, self.options.width, self.options.height),
                None => image,
            })
        } else {
            None
        };

        let crops: Vec<Option<RgbImage>> = if self.options.crop
            && (self.options.video || self.options.folder)
        {
            faces
                .iter()
                .map(|face| {
                    crop(frame, face).map(|c| match self.options.resize_to() {
                        Some(_) => resize(&c, self.options.width, self.options.height),
                        None => c,
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        if self.options.video {
            if let Some(image) = tagged.as_ref() {
                self.write_tag_video(image)?;
            }
            if self.options.crop {
                self.write_person_videos(&identities, &crops)?;
            }
        }

        if self.options.folder {
            if let Some(image) = tagged.as_ref() {
                save_image(image, &self.tag_image_path(frame_index))?;
            }
            for (identity, image) in identities.iter().zip(&crops) {
                if let Some(image) = image {
                    save_image(image, &self.crop_image_path(identity, frame_index))?;
                }
            }
        }

        self.frames_written += 1;
        self.last_written = Some(frame_index);
        Ok(())
    }

    fn factory(&self) -> MediaResult<&dyn VideoSinkFactory> {
        self.sinks
            .as_deref()
            .ok_or_else(|| MediaError::video_write("no video encoder configured"))
    }

    fn write_tag_video(&mut self, image: &RgbImage) -> MediaResult<()> {
        if self.tag_video.is_none() {
            let sink = self
                .factory()?
                .create(&self.tag_video_path(), self.fps, image.dimensions())?;
            self.tag_video = Some(sink);
        }
        if let Some(sink) = self.tag_video.as_mut() {
            sink.write(image)?;
        }
        Ok(())
    }

    fn write_person_videos(
        &mut self,
        identities: &[String],
        crops: &[Option<RgbImage>],
    ) -> MediaResult<()> {
        let frame_no = self.frames_written + 1;

        for (identity, image) in identities.iter().zip(crops) {
            let Some(image) = image else { continue };
            if !self.person_videos.contains_key(identity) {
                let size = image.dimensions();
                let path = self.person_video_path(identity);
                let mut sink = self.factory()?.create(&path, self.fps, size)?;
                for _ in 0..self.frames_written {
                    sink.write(&blank(size.0, size.1))?;
                }
                self.person_videos.insert(
                    identity.clone(),
                    PersonVideo {
                        sink,
                        size,
                        written: self.frames_written,
                    },
                );
            }
            if let Some(video) = self.person_videos.get_mut(identity) {
                // one face per identity and frame
                if video.written < frame_no {
                    video.sink.write(image)?;
                    video.written = frame_no;
                }
            }
        }

        for video in self.person_videos.values_mut() {
            if video.written < frame_no {
                video.sink.write(&blank(video.size.0, video.size.1))?;
                video.written = frame_no;
            }
        }
        Ok(())
    }

    /// Flush the CSV and close every video.
    pub fn close(&mut self) -> MediaResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(csv) = self.csv.as_mut() {
            csv.flush()?;
        }
        if let Some(mut sink) = self.tag_video.take() {
            sink.close()?;
        }
        for (_, mut video) in std::mem::take(&mut self.person_videos) {
            video.sink.close()?;
        }
        info!(
            base = %self.base.display(),
            frames = self.frames_written,
            persons = self.persons.len(),
            "Closed result writer"
        );
        Ok(())
    }
}

impl Drop for ResultWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!(base = %self.base.display(), "Result writer dropped without close");
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close result writer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scored, RecordingSinks};

    fn label(identity: &str, index: usize) -> Option<PersonLabel> {
        Some(PersonLabel::new(identity, index, 1.0))
    }

    #[test]
    fn test_output_paths() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let mut writer = ResultWriter::new(FaceTrackingOptions::default(), &base, "clip", 25.0)
            .unwrap()
            .with_video_extension(".AVI")
            .unwrap();
        assert_eq!(writer.csv_path(), dir.path().join("out.csv"));
        assert_eq!(writer.tag_video_path(), dir.path().join("out.avi"));
        assert_eq!(writer.person_video_path("unk_001"), dir.path().join("out_unk_001.avi"));
        assert_eq!(writer.tag_image_path(3), base.join("clip_000003.png"));
        assert_eq!(
            writer.crop_image_path("alice", 3),
            base.join("alice").join("clip_000003.png")
        );
        writer.close().unwrap();
    }

    #[test]
    fn test_rejects_unknown_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let new = || {
            ResultWriter::new(FaceTrackingOptions::csv_only(), dir.path().join("out"), "x", 1.0)
                .unwrap()
        };
        assert!(matches!(
            new().with_image_extension("txt"),
            Err(MediaError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            new().with_video_extension("mov"),
            Err(MediaError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_csv_rows_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let mut writer =
            ResultWriter::new(FaceTrackingOptions::csv_only(), &base, "clip", 25.0).unwrap();
        let frame = RgbImage::new(100, 100);
        writer.write_frame(0, &frame, &[], &[], &[]).unwrap();
        writer
            .write_frame(
                1,
                &frame,
                &[scored(10, 10, 20, 20, 0.8)],
                &[vec![(15, 15)]],
                &[label("unk_000", 0)],
            )
            .unwrap();
        writer.close().unwrap();

        let text = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["clip_000000;", "1;clip_000001;0;10;10;20;20;0.800;unk_000;15;15"]
        );
        assert_eq!(writer.persons(), &["unk_000".to_string()]);
    }

    #[test]
    fn test_person_videos_backfill_and_pad() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let options = FaceTrackingOptions {
            csv: false,
            crop: true,
            video: true,
            ..FaceTrackingOptions::default()
        };
        let sinks = RecordingSinks::default();
        let mut writer = ResultWriter::new(options, &base, "clip", 25.0)
            .unwrap()
            .with_video_sinks(Box::new(sinks.clone()));

        let frame = RgbImage::from_pixel(100, 100, image::Rgb([200, 200, 200]));
        let face = scored(10, 10, 20, 20, 0.9);
        // frame 0: alice only; frame 1: bob only; frame 2: both
        writer.write_frame(0, &frame, &[face], &[], &[label("alice", 0)]).unwrap();
        writer.write_frame(1, &frame, &[face], &[], &[label("bob", 1)]).unwrap();
        writer
            .write_frame(2, &frame, &[face, face], &[], &[label("alice", 0), label("bob", 1)])
            .unwrap();
        writer.close().unwrap();

        let alice = sinks.frames(&dir.path().join("out_alice.mp4"));
        let bob = sinks.frames(&dir.path().join("out_bob.mp4"));
        assert_eq!(alice.len(), 3);
        assert_eq!(bob.len(), 3);
        // padded while absent
        assert_eq!(alice[1].get_pixel(0, 0), &image::Rgb([0, 0, 0]));
        assert_eq!(alice[2].get_pixel(0, 0), &image::Rgb([200, 200, 200]));
        // backfilled before first sighting
        assert_eq!(bob[0].get_pixel(0, 0), &image::Rgb([0, 0, 0]));
        assert_eq!(bob[1].dimensions(), (20, 20));
        assert!(sinks.is_closed(&dir.path().join("out_bob.mp4")));
    }

    #[test]
    fn test_tag_video_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("out");
        let options = FaceTrackingOptions {
            csv: false,
            tag: true,
            crop: true,
            video: true,
            folder: true,
            ..FaceTrackingOptions::default()
        }
        .with_size(50, 0);
        let sinks = RecordingSinks::default();
        let mut writer = ResultWriter::new(options, &base, "clip", 25.0)
            .unwrap()
            .with_video_sinks(Box::new(sinks.clone()))
            .with_image_extension("jpg")
            .unwrap();
        let frame = RgbImage::new(100, 80);
        writer
            .write_frame(4, &frame, &[scored(10, 10, 20, 20, 0.9)], &[], &[None])
            .unwrap();
        writer.close().unwrap();

        let tagged = sinks.frames(&dir.path().join("out.mp4"));
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].dimensions(), (50, 40));
        assert!(base.join("clip_000004.jpg").exists());
        assert!(base.join("unk_000").join("clip_000004.jpg").exists());
        assert_eq!(sinks.frames(&dir.path().join("out_unk_000.mp4")).len(), 1);
    }

    #[test]
    fn test_video_without_encoder_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultWriter::new(
            FaceTrackingOptions::tagged_video(),
            dir.path().join("out"),
            "clip",
            25.0,
        )
        .unwrap();
        let result = writer.write_frame(0, &RgbImage::new(10, 10), &[], &[], &[]);
        assert!(matches!(result, Err(MediaError::VideoWrite(_))));
        writer.close().unwrap();
    }
}
