//! Semicolon separated detection file.
//!
//! One row per detected face:
//! `frame_index;image_name;face_index;x;y;w;h;confidence;person_id;lx1;ly1;...`
//!
//! A frame without any face is written as `image_name;`. The file is opened
//! in append mode so successive windows accumulate into one file.

use crate::error::{MediaError, MediaResult};
use crate::tracking::{Landmarks, PersonLabel};
use facetrack_models::BoundingBox;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Field separator.
pub const SEPARATOR: char = ';';

/// Person field of a face without identity.
pub const UNDETERMINED: &str = "undetermined";

/// Name of the image of a frame, also used for exported image files.
pub fn image_name(stem: &str, frame_index: usize) -> String {
    format!("{stem}_{frame_index:06}")
}

/// Rows describing one frame.
pub fn format_frame(
    frame_index: usize,
    image_name: &str,
    faces: &[BoundingBox],
    persons: &[Option<PersonLabel>],
    landmarks: &[Landmarks],
) -> Vec<String> {
    if faces.is_empty() {
        return vec![format!("{image_name}{SEPARATOR}")];
    }
    faces
        .iter()
        .enumerate()
        .map(|(j, face)| {
            let person = persons
                .get(j)
                .and_then(|p| p.as_ref())
                .map(|p| p.identity.as_str())
                .unwrap_or(UNDETERMINED);
            let mut row = format!(
                "{frame_index};{image_name};{j};{};{};{};{};{:.3};{person}",
                face.x(),
                face.y(),
                face.w(),
                face.h(),
                face.confidence()
            );
            if let Some(points) = landmarks.get(j) {
                for (x, y) in points {
                    row.push_str(&format!(";{x};{y}"));
                }
            }
            row
        })
        .collect()
}

/// Appends detection rows to a CSV file.
pub struct CsvWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl CsvWriter {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> MediaResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_frame(
        &mut self,
        frame_index: usize,
        image_name: &str,
        faces: &[BoundingBox],
        persons: &[Option<PersonLabel>],
        landmarks: &[Landmarks],
    ) -> MediaResult<()> {
        for row in format_frame(frame_index, image_name, faces, persons, landmarks) {
            writeln!(self.out, "{row}")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> MediaResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// One face parsed back from a CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvFace {
    pub frame_index: usize,
    pub face_index: usize,
    pub bbox: BoundingBox,
    /// `None` for `undetermined`
    pub person: Option<String>,
    pub landmarks: Landmarks,
}

/// One parsed CSV row.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub image_name: String,
    /// `None` for a frame without faces
    pub face: Option<CsvFace>,
}

fn field<T: std::str::FromStr>(fields: &[&str], i: usize, line: usize) -> MediaResult<T> {
    fields
        .get(i)
        .and_then(|f| f.trim().parse().ok())
        .ok_or_else(|| MediaError::UnsupportedFormat(format!("CSV line {line}: bad field {i}")))
}

/// Parse one CSV line; `line` is the 1-based line number for errors.
pub fn parse_row(text: &str, line: usize) -> MediaResult<CsvRow> {
    let fields: Vec<&str> = text.split(SEPARATOR).collect();
    if fields.len() == 2 && fields[1].is_empty() {
        return Ok(CsvRow {
            image_name: fields[0].to_string(),
            face: None,
        });
    }
    if fields.len() < 9 || (fields.len() - 9) % 2 != 0 {
        return Err(MediaError::UnsupportedFormat(format!(
            "CSV line {line}: unexpected number of fields ({})",
            fields.len()
        )));
    }

    let bbox = BoundingBox::new(
        field(&fields, 3, line)?,
        field(&fields, 4, line)?,
        field(&fields, 5, line)?,
        field(&fields, 6, line)?,
    )?
    .with_confidence(field(&fields, 7, line)?)?;
    let person = match fields[8] {
        UNDETERMINED => None,
        p => Some(p.to_string()),
    };
    let mut landmarks = Vec::with_capacity((fields.len() - 9) / 2);
    for i in (9..fields.len()).step_by(2) {
        landmarks.push((field(&fields, i, line)?, field(&fields, i + 1, line)?));
    }

    Ok(CsvRow {
        image_name: fields[1].to_string(),
        face: Some(CsvFace {
            frame_index: field(&fields, 0, line)?,
            face_index: field(&fields, 2, line)?,
            bbox,
            person,
            landmarks,
        }),
    })
}

/// Read every row of a detection file.
pub fn read_csv(path: &Path) -> MediaResult<Vec<CsvRow>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(&line, i + 1)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: u32, y: u32, c: f32) -> BoundingBox {
        BoundingBox::new(x, y, 20, 30).unwrap().with_confidence(c).unwrap()
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_name("video", 12), "video_000012");
    }

    #[test]
    fn test_empty_frame_row() {
        let rows = format_frame(3, "video_000003", &[], &[], &[]);
        assert_eq!(rows, vec!["video_000003;".to_string()]);
    }

    #[test]
    fn test_face_rows() {
        let faces = [face(1, 2, 0.91234), face(50, 60, 0.5)];
        let persons = [Some(PersonLabel::new("unk_000", 0, 1.0)), None];
        let landmarks = vec![vec![(3, 4), (-1, 7)], Vec::new()];
        let rows = format_frame(7, "v_000007", &faces, &persons, &landmarks);
        assert_eq!(
            rows,
            vec![
                "7;v_000007;0;1;2;20;30;0.912;unk_000;3;4;-1;7".to_string(),
                "7;v_000007;1;50;60;20;30;0.500;undetermined".to_string(),
            ]
        );
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        {
            let mut writer = CsvWriter::open(&path).unwrap();
            writer.write_frame(0, "v_000000", &[], &[], &[]).unwrap();
            writer.flush().unwrap();
        }
        {
            let mut writer = CsvWriter::open(&path).unwrap();
            let persons = [Some(PersonLabel::new("alice", 0, 0.9))];
            writer
                .write_frame(1, "v_000001", &[face(5, 6, 0.75)], &persons, &[vec![(8, 9)]])
                .unwrap();
            writer.flush().unwrap();
        }

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("v_000000;\n"));

        let rows = read_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].face.is_none());
        let parsed = rows[1].face.as_ref().unwrap();
        assert_eq!(parsed.frame_index, 1);
        assert_eq!(parsed.bbox, [5, 6, 20, 30]);
        assert_eq!(parsed.bbox.confidence(), 0.75);
        assert_eq!(parsed.person.as_deref(), Some("alice"));
        assert_eq!(parsed.landmarks, vec![(8, 9)]);
    }

    #[test]
    fn test_parse_rejects_truncated_rows() {
        assert!(parse_row("1;a;0;1;2", 1).is_err());
        assert!(parse_row("1;a;0;1;2;3;4;0.5;p;7", 1).is_err());
    }
}
