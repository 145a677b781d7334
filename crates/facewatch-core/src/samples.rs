//! Filename-addressed sample store.
//!
//! Captured face crops are persisted as `person.<personId>.<seq>.jpg` in a
//! flat directory. The id is content-addressed by convention: training
//! recovers it by splitting the filename on `.` and reading the second
//! field. That parse is a compatibility contract — existing sample sets
//! must keep working — so any change here must preserve it.

use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Leading filename field of every sample file.
pub const SAMPLE_PREFIX: &str = "person";

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode failed for {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Build the canonical sample file name for `(person_id, sequence)`.
pub fn sample_file_name(person_id: i32, sequence: u32) -> String {
    format!("{SAMPLE_PREFIX}.{person_id}.{sequence}.jpg")
}

/// Parse `(person_id, sequence)` out of a sample file name.
///
/// Returns `None` for anything that does not match the
/// `person.<id>.<seq>.<ext>` shape; malformed names are the caller's
/// problem to log and skip, never to abort on.
pub fn parse_sample_name(name: &str) -> Option<(i32, u32)> {
    let mut fields = name.split('.');
    if fields.next()? != SAMPLE_PREFIX {
        return None;
    }
    let person_id: i32 = fields.next()?.parse().ok()?;
    let sequence: u32 = fields.next()?.parse().ok()?;
    // Extension must be present; legacy sample sets match person.*.*.jpg.
    fields.next()?;
    Some((person_id, sequence))
}

/// Flat-directory store of captured face crops.
pub struct SampleStore {
    dir: PathBuf,
}

impl SampleStore {
    /// Open (and create if missing) the store at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SampleError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one crop under `(person_id, sequence)`, returning its path.
    pub fn save(
        &self,
        person_id: i32,
        sequence: u32,
        face: &GrayImage,
    ) -> Result<PathBuf, SampleError> {
        let path = self.dir.join(sample_file_name(person_id, sequence));
        face.save(&path).map_err(|source| SampleError::Encode {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "sample saved");
        Ok(path)
    }

    /// All well-formed sample files as `(person_id, path)`.
    ///
    /// Files that do not parse are skipped with a warning.
    pub fn scan(&self) -> Result<Vec<(i32, PathBuf)>, SampleError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match parse_sample_name(name) {
                Some((person_id, _)) => out.push((person_id, path)),
                None => {
                    tracing::warn!(file = name, "skipping file with unparseable sample name");
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Next free sequence number for `person_id` (1-based, no reuse of gaps).
    pub fn next_sequence(&self, person_id: i32) -> Result<u32, SampleError> {
        let mut max_seq = 0u32;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some((id, seq)) = parse_sample_name(&name) {
                if id == person_id {
                    max_seq = max_seq.max(seq);
                }
            }
        }
        Ok(max_seq + 1)
    }

    /// Number of well-formed sample files in the store.
    pub fn count(&self) -> Result<usize, SampleError> {
        Ok(self.scan()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_name_roundtrip() {
        let name = sample_file_name(7, 3);
        assert_eq!(name, "person.7.3.jpg");
        assert_eq!(parse_sample_name(&name), Some((7, 3)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_sample_name("person.7.jpg"), None); // missing sequence
        assert_eq!(parse_sample_name("face.7.1.jpg"), None); // wrong prefix
        assert_eq!(parse_sample_name("person.abc.1.jpg"), None);
        assert_eq!(parse_sample_name("person.1.xyz.jpg"), None);
        assert_eq!(parse_sample_name("readme.txt"), None);
    }

    #[test]
    fn test_parse_tolerates_extra_extension_fields() {
        // person.2.10.jpg.bak still yields the embedded id/seq fields.
        assert_eq!(parse_sample_name("person.2.10.jpg.bak"), Some((2, 10)));
    }

    #[test]
    fn test_save_and_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SampleStore::open(tmp.path()).unwrap();
        let face = GrayImage::from_pixel(8, 8, image::Luma([128u8]));

        store.save(7, 1, &face).unwrap();
        store.save(7, 2, &face).unwrap();
        store.save(9, 1, &face).unwrap();
        // Garbage file must be ignored.
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let scanned = store.scan().unwrap();
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned.iter().filter(|(id, _)| *id == 7).count(), 2);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_next_sequence_starts_at_one_and_increments() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SampleStore::open(tmp.path()).unwrap();
        let face = GrayImage::from_pixel(8, 8, image::Luma([10u8]));

        assert_eq!(store.next_sequence(5).unwrap(), 1);
        store.save(5, 1, &face).unwrap();
        assert_eq!(store.next_sequence(5).unwrap(), 2);
        store.save(5, 2, &face).unwrap();
        assert_eq!(store.next_sequence(5).unwrap(), 3);
        // Other people do not interfere.
        assert_eq!(store.next_sequence(6).unwrap(), 1);
    }
}
