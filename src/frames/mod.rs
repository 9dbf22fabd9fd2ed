use std::{
    collections::HashMap,
    fmt::Write as _,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::PathBuf,
    sync::Arc,
};

use log::{debug, info};
use thiserror::Error;

pub const HEADER_SIZE: u64 = 32;
pub const TRAILER_SIZE: u64 = 16;
pub const END_MARKER: u32 = 0xDEAD_BEEF;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("file is {size} bytes, too small to hold a header and trailer")]
    TooSmall { size: u64 },
    #[error("file holds no frames between header and trailer")]
    Empty,
    #[error("bad end marker 0x{found:08X}, expected 0xDEADBEEF")]
    CorruptTrailer { found: u32 },
    #[error("trailer declares {declared} frames but the file holds {actual}")]
    FrameCountMismatch { declared: u32, actual: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The integrity metadata recorded in an animation file's trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrailerInfo {
    pub frame_count: u32,
    pub saved_at_millis: u64,
}

/// One timestep of pixel colours: `pixel_count` consecutive RGB triples in
/// row-major grid order. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
}

impl Frame {
    pub fn pixel(&self, index: usize) -> [u8; 3] {
        [
            self.data[index * 3],
            self.data[index * 3 + 1],
            self.data[index * 3 + 2],
        ]
    }

    pub fn pixel_count(&self) -> usize {
        self.data.len() / 3
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Render the frame as truecolour background blocks for the terminal,
    /// one row of the square grid per line.
    pub fn ansi_preview(&self, side: usize) -> String {
        let mut out = String::new();
        for y in 0..side {
            for x in 0..side {
                let [r, g, b] = self.pixel(y * side + x);
                let _ = write!(out, "\x1b[48;2;{};{};{}m  \x1b[0m", r, g, b);
            }
            out.push('\n');
        }
        out
    }
}

/// Check the trailer of an open animation file without touching the frame
/// data. A mismatch anywhere invalidates the whole file; truncated playback
/// is never attempted.
pub fn validate(file: &mut File, frame_size: usize) -> Result<TrailerInfo, ValidationError> {
    let size = file.seek(SeekFrom::End(0))?;

    if size < HEADER_SIZE + TRAILER_SIZE {
        return Err(ValidationError::TooSmall { size });
    }
    if size == HEADER_SIZE + TRAILER_SIZE {
        return Err(ValidationError::Empty);
    }

    file.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
    let mut trailer = [0u8; TRAILER_SIZE as usize];
    file.read_exact(&mut trailer)?;

    let declared = u32::from_le_bytes(trailer[0..4].try_into().unwrap());
    let saved_at_millis = u64::from_le_bytes(trailer[4..12].try_into().unwrap());
    let marker = u32::from_le_bytes(trailer[12..16].try_into().unwrap());

    if marker != END_MARKER {
        return Err(ValidationError::CorruptTrailer { found: marker });
    }

    let data_size = size - HEADER_SIZE - TRAILER_SIZE;
    let actual = (data_size / frame_size as u64) as u32;
    if data_size % frame_size as u64 != 0 || actual != declared {
        return Err(ValidationError::FrameCountMismatch { declared, actual });
    }

    Ok(TrailerInfo {
        frame_count: declared,
        saved_at_millis,
    })
}

/// Loads animation files and memoises them by filename for the life of the
/// process. Validation and loading run on the same open file handle so a
/// file swapped on disk between the two passes cannot slip through.
pub struct FrameStore {
    directory: PathBuf,
    frame_size: usize,
    cache: HashMap<String, Arc<Vec<Frame>>>,
}

impl FrameStore {
    pub fn new(directory: impl Into<PathBuf>, frame_size: usize) -> Self {
        Self {
            directory: directory.into(),
            frame_size,
            cache: HashMap::new(),
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Fetch a file's frames, reading and validating it on first use.
    pub fn get(&mut self, name: &str) -> Result<Arc<Vec<Frame>>, ValidationError> {
        if let Some(frames) = self.cache.get(name) {
            debug!("{name}: serving {} cached frames", frames.len());
            return Ok(frames.clone());
        }

        let path = self.directory.join(name);
        let mut file = File::open(&path)?;

        let info = validate(&mut file, self.frame_size)?;
        info!(
            "{name}: {} frames, saved at {}ms",
            info.frame_count, info.saved_at_millis
        );

        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut frames = Vec::with_capacity(info.frame_count as usize);
        for _ in 0..info.frame_count {
            let mut data = vec![0u8; self.frame_size];
            file.read_exact(&mut data)?;
            frames.push(Frame { data });
        }

        let frames = Arc::new(frames);
        self.cache.insert(name.to_string(), frames.clone());
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_animation(
        dir: &std::path::Path,
        name: &str,
        frames: &[Vec<u8>],
        declared: u32,
        marker: u32,
    ) {
        let mut file = File::create(dir.join(name)).unwrap();
        file.write_all(&[0u8; HEADER_SIZE as usize]).unwrap();
        for frame in frames {
            file.write_all(frame).unwrap();
        }
        file.write_all(&declared.to_le_bytes()).unwrap();
        file.write_all(&1_700_000_000_000u64.to_le_bytes()).unwrap();
        file.write_all(&marker.to_le_bytes()).unwrap();
    }

    fn open(dir: &std::path::Path, name: &str) -> File {
        File::open(dir.join(name)).unwrap()
    }

    const FRAME_SIZE: usize = 48; // 4x4 grid

    #[test]
    fn test_validate_accepts_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![vec![1u8; FRAME_SIZE], vec![2u8; FRAME_SIZE]];
        write_animation(dir.path(), "ok.bin", &frames, 2, END_MARKER);

        let info = validate(&mut open(dir.path(), "ok.bin"), FRAME_SIZE).unwrap();
        assert_eq!(2, info.frame_count);
        assert_eq!(1_700_000_000_000, info.saved_at_millis);
    }

    #[test]
    fn test_validate_rejects_short_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();

        std::fs::write(dir.path().join("short.bin"), [0u8; 20]).unwrap();
        assert!(matches!(
            validate(&mut open(dir.path(), "short.bin"), FRAME_SIZE),
            Err(ValidationError::TooSmall { size: 20 })
        ));

        write_animation(dir.path(), "empty.bin", &[], 0, END_MARKER);
        assert!(matches!(
            validate(&mut open(dir.path(), "empty.bin"), FRAME_SIZE),
            Err(ValidationError::Empty)
        ));
    }

    #[test]
    fn test_validate_rejects_bad_marker() {
        let dir = tempfile::tempdir().unwrap();
        write_animation(
            dir.path(),
            "marker.bin",
            &[vec![0u8; FRAME_SIZE]],
            1,
            0xCAFEBABE,
        );

        assert!(matches!(
            validate(&mut open(dir.path(), "marker.bin"), FRAME_SIZE),
            Err(ValidationError::CorruptTrailer { found: 0xCAFEBABE })
        ));
    }

    #[test]
    fn test_validate_rejects_frame_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_animation(
            dir.path(),
            "count.bin",
            &[vec![0u8; FRAME_SIZE], vec![0u8; FRAME_SIZE]],
            3,
            END_MARKER,
        );

        assert!(matches!(
            validate(&mut open(dir.path(), "count.bin"), FRAME_SIZE),
            Err(ValidationError::FrameCountMismatch {
                declared: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_validate_rejects_ragged_frame_data() {
        let dir = tempfile::tempdir().unwrap();
        // One full frame plus two stray bytes; floor division alone would
        // still see one frame
        let frames = vec![vec![0u8; FRAME_SIZE], vec![0u8; 2]];
        write_animation(dir.path(), "ragged.bin", &frames, 1, END_MARKER);

        assert!(matches!(
            validate(&mut open(dir.path(), "ragged.bin"), FRAME_SIZE),
            Err(ValidationError::FrameCountMismatch { .. })
        ));
    }

    #[test]
    fn test_store_loads_and_caches_by_filename() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![vec![10u8; FRAME_SIZE], vec![20u8; FRAME_SIZE]];
        write_animation(dir.path(), "show.bin", &frames, 2, END_MARKER);

        let mut store = FrameStore::new(dir.path(), FRAME_SIZE);

        let first = store.get("show.bin").unwrap();
        assert_eq!(2, first.len());
        assert_eq!([10, 10, 10], first[0].pixel(0));
        assert_eq!([20, 20, 20], first[1].pixel(15));
        assert!(first.iter().all(|f| f.as_bytes().len() == FRAME_SIZE));

        // Second fetch must be the identical cached sequence, even if the
        // file disappears in between
        std::fs::remove_file(dir.path().join("show.bin")).unwrap();
        let second = store.get("show.bin").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_store_refuses_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        write_animation(
            dir.path(),
            "bad.bin",
            &[vec![0u8; FRAME_SIZE]],
            7,
            END_MARKER,
        );

        let mut store = FrameStore::new(dir.path(), FRAME_SIZE);
        assert!(store.get("bad.bin").is_err());
    }

    #[test]
    fn test_ansi_preview_draws_one_row_per_line() {
        let mut data = vec![0u8; FRAME_SIZE];
        data[0] = 255; // pixel 0 pure red
        let frame = Frame { data };

        let preview = frame.ansi_preview(4);
        assert_eq!(4, preview.lines().count());
        assert!(preview.starts_with("\x1b[48;2;255;0;0m"));
    }
}
