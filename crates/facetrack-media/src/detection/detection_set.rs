//! Ordered detection results of one `detect()` pass.

use facetrack_models::BoundingBox;

/// Default overlap percentage above which a detection is a duplicate.
pub const DEFAULT_OVERLAP_PCT: f32 = 50.0;

/// Detections sorted by descending confidence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
    boxes: Vec<BoundingBox>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from unordered detections.
    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        let mut set = Self { boxes };
        set.sort();
        set
    }

    /// Stable sort by descending confidence.
    pub fn sort(&mut self) {
        self.boxes
            .sort_by(|a, b| b.confidence().total_cmp(&a.confidence()));
    }

    pub fn push(&mut self, bbox: BoundingBox) {
        self.boxes.push(bbox);
    }

    pub fn clear(&mut self) {
        self.boxes.clear();
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundingBox> {
        self.boxes.iter()
    }

    pub fn as_slice(&self) -> &[BoundingBox] {
        &self.boxes
    }

    pub fn into_vec(self) -> Vec<BoundingBox> {
        self.boxes
    }

    /// Best detection, `None` when nothing was detected.
    pub fn best(&self) -> Option<BoundingBox> {
        self.boxes.first().copied()
    }

    /// Copies of the `n` best detections padded with `None` up to `n`.
    ///
    /// Returns `None` when nothing was detected.
    pub fn get_best(&self, n: usize) -> Option<Vec<Option<BoundingBox>>> {
        if self.boxes.is_empty() {
            return None;
        }
        Some((0..n).map(|i| self.boxes.get(i).copied()).collect())
    }

    /// Copies of the detections with confidence strictly above `confidence`.
    pub fn above(&self, confidence: f32) -> Vec<BoundingBox> {
        self.boxes
            .iter()
            .filter(|b| b.confidence() > confidence)
            .copied()
            .collect()
    }

    /// Keep the `n` best detections; no-op unless it reduces the count.
    pub fn filter_best(&mut self, n: usize) {
        if n < self.boxes.len() {
            self.boxes.truncate(n);
        }
    }

    /// Keep detections above `confidence`; no-op unless it reduces the count.
    pub fn filter_confidence(&mut self, confidence: f32) {
        let kept = self.above(confidence);
        if kept.len() < self.boxes.len() {
            self.boxes = kept;
        }
    }

    /// Flag duplicates among overlapping detections.
    ///
    /// Walks the pairs in confidence order. A box whose own area is covered
    /// more than `overlap_pct` percent by another box at least as wide or as
    /// tall is cancelled; a cancelled box never cancels another one.
    pub fn overlapped_flags(&self, overlap_pct: f32) -> Vec<bool> {
        let n = self.boxes.len();
        let mut cancelled = vec![false; n];
        for i in 0..n {
            for j in (i + 1)..n {
                if cancelled[i] {
                    break;
                }
                if cancelled[j] {
                    continue;
                }
                let (a, b) = (&self.boxes[i], &self.boxes[j]);
                let (pct_b, pct_a) = b.overlap(a);
                if pct_b > overlap_pct && (a.w() >= b.w() || a.h() >= b.h()) {
                    cancelled[j] = true;
                } else if pct_a > overlap_pct && (b.w() >= a.w() || b.h() >= a.h()) {
                    cancelled[i] = true;
                }
            }
        }
        cancelled
    }

    /// Remove duplicates among overlapping detections.
    ///
    /// Cancelled boxes get a zero confidence, then are dropped.
    pub fn filter_overlapped(&mut self, overlap_pct: f32) {
        let cancelled = self.overlapped_flags(overlap_pct);
        if !cancelled.iter().any(|c| *c) {
            return;
        }
        let mut kept = Vec::with_capacity(self.boxes.len());
        for (mut bbox, cancel) in self.boxes.drain(..).zip(cancelled) {
            if cancel {
                // 0 is always a valid confidence
                let _ = bbox.set_confidence(0.0);
            } else {
                kept.push(bbox);
            }
        }
        self.boxes = kept;
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a BoundingBox;
    type IntoIter = std::slice::Iter<'a, BoundingBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.iter()
    }
}
