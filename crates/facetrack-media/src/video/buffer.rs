//! Sliding window over a decoded video stream.
//!
//! The buffer holds at most `size` frames. Each call to [`VideoBuffer::next`]
//! keeps the last `overlap` frames of the previous window as the head of the
//! new one, so consumers see a seamless transition between windows.

use super::reader::VideoReader;
use crate::error::{MediaError, MediaResult};
use image::RgbImage;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{debug, info};

/// Default number of frames per window.
pub const DEFAULT_BUFFER_SIZE: usize = 200;

/// Default number of frames carried between windows.
pub const DEFAULT_BUFFER_OVERLAP: usize = 0;

fn check_size(size: usize, overlap: usize) -> MediaResult<()> {
    if size == 0 {
        return Err(MediaError::InvalidBufferSize(size));
    }
    if overlap >= size {
        return Err(MediaError::InvalidOverlap { overlap, size });
    }
    Ok(())
}

pub struct VideoBuffer {
    reader: Box<dyn VideoReader>,
    size: usize,
    overlap: usize,
    frames: Vec<RgbImage>,
    /// Inclusive absolute frame range of `frames`
    range: Option<(usize, usize)>,
}

impl VideoBuffer {
    /// Create a buffer of `size` frames carrying `overlap` frames between windows.
    pub fn new(reader: Box<dyn VideoReader>, size: usize, overlap: usize) -> MediaResult<Self> {
        check_size(size, overlap)?;
        Ok(Self {
            reader,
            size,
            overlap,
            frames: Vec::new(),
            range: None,
        })
    }

    /// Create a buffer with the default size and overlap.
    pub fn with_defaults(reader: Box<dyn VideoReader>) -> Self {
        Self {
            reader,
            size: DEFAULT_BUFFER_SIZE,
            overlap: DEFAULT_BUFFER_OVERLAP,
            frames: Vec::new(),
            range: None,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn set_size(&mut self, size: usize) -> MediaResult<()> {
        check_size(size, self.overlap)?;
        self.size = size;
        Ok(())
    }

    pub fn set_overlap(&mut self, overlap: usize) -> MediaResult<()> {
        check_size(self.size, overlap)?;
        self.overlap = overlap;
        Ok(())
    }

    /// Open a video and drop any buffered frames.
    pub fn open(&mut self, path: &Path) -> MediaResult<()> {
        self.clear();
        self.reader.open(path)?;
        info!(
            path = %path.display(),
            size = self.size,
            overlap = self.overlap,
            "Video buffer opened"
        );
        Ok(())
    }

    pub fn is_opened(&self) -> bool {
        self.reader.is_opened()
    }

    /// Release the decoder and drop buffered frames.
    pub fn close(&mut self) {
        self.clear();
        self.reader.close();
    }

    /// Drop buffered frames and rewind the decoder to the first frame.
    pub fn reset(&mut self) -> MediaResult<()> {
        self.seek_buffer(0)
    }

    /// Drop buffered frames and position the decoder at `frame`.
    pub fn seek_buffer(&mut self, frame: usize) -> MediaResult<()> {
        self.clear();
        if self.reader.is_opened() {
            self.reader.seek(frame)?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.range = None;
    }

    /// Fill the next window.
    ///
    /// Returns whether frames remain after this window. The window just read
    /// must be processed whatever the returned value; an unopened video or an
    /// exhausted stream leaves the window empty.
    pub fn next(&mut self) -> MediaResult<bool> {
        if !self.reader.is_opened() {
            self.clear();
            return Ok(false);
        }

        let carry = if self.range.is_some() {
            self.overlap.min(self.frames.len())
        } else {
            0
        };
        let start = self.reader.tell();
        let wanted = self.size - carry;
        let fresh = self.reader.read(wanted)?;

        if fresh.is_empty() {
            self.clear();
            debug!(position = start, "No more frames to buffer");
            return Ok(false);
        }

        let mut window = self.frames.split_off(self.frames.len() - carry);
        let read = fresh.len();
        window.extend(fresh);

        let begin = start - carry;
        let end = begin + window.len() - 1;
        self.frames = window;
        self.range = Some((begin, end));
        debug!(begin, end, carried = carry, read, "Video buffer filled");

        let nframes = self.reader.nframes();
        Ok(read == wanted && (nframes == 0 || self.reader.tell() < nframes))
    }

    /// Inclusive absolute frame range of the current window.
    pub fn buffer_range(&self) -> Option<(usize, usize)> {
        self.range
    }

    /// Absolute frame indices of the current window.
    pub fn indices(&self) -> Option<RangeInclusive<usize>> {
        self.range.map(|(begin, end)| begin..=end)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames of the current window.
    pub fn frames(&self) -> &[RgbImage] {
        &self.frames
    }

    /// Validate an absolute frame index and return its position in the window.
    pub fn check_buffer_index(&self, index: usize) -> MediaResult<usize> {
        let (begin, end) = self.range.ok_or(MediaError::NoBufferLoaded)?;
        if index < begin || index > end {
            return Err(MediaError::IndexOutOfRange { index, begin, end });
        }
        Ok(index - begin)
    }

    /// Frame at an absolute index within the current window.
    pub fn frame(&self, index: usize) -> MediaResult<&RgbImage> {
        let i = self.check_buffer_index(index)?;
        Ok(&self.frames[i])
    }

    pub fn framerate(&self) -> f64 {
        self.reader.framerate()
    }

    pub fn width(&self) -> u32 {
        self.reader.width()
    }

    pub fn height(&self) -> u32 {
        self.reader.height()
    }

    pub fn nframes(&self) -> usize {
        self.reader.nframes()
    }

    /// Index of the next frame the decoder will read.
    pub fn tell(&self) -> usize {
        self.reader.tell()
    }
}

impl std::fmt::Debug for VideoBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoBuffer")
            .field("size", &self.size)
            .field("overlap", &self.overlap)
            .field("range", &self.range)
            .field("opened", &self.reader.is_opened())
            .finish()
    }
}
