use std::path::Path;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use log::info;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid time {value:?}: expected the compact YYYYMMDDhhmmss form")]
    InvalidTimeFormat { value: String },
    #[error("schedule entry {index} ({filename:?}) carries neither a time nor an index")]
    MissingCue { index: usize, filename: String },
    #[error("failed to read schedule file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse schedule file: {0}")]
    Json(#[from] serde_json::Error),
}

/// When a schedule entry should play: at an absolute wall-clock time
/// (scheduled deployment) or as the n-th transport slot (triggered
/// deployment).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    At(DateTime<Local>),
    Index(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleEntry {
    pub filename: String,
    pub cue: Cue,
}

#[derive(Deserialize)]
struct RawEntry {
    filename: String,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    index: Option<usize>,
}

/// Parse the schedule's compact local timestamp, e.g. `20250525180000`.
pub fn parse_compact_time(value: &str) -> Result<DateTime<Local>, ScheduleError> {
    let invalid = || ScheduleError::InvalidTimeFormat {
        value: value.to_string(),
    };

    if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let naive =
        NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S").map_err(|_| invalid())?;

    // Reject times that do not exist in the local timezone (DST gaps)
    Local.from_local_datetime(&naive).earliest().ok_or_else(invalid)
}

/// Load the ordered schedule from a JSON file. Entries keep file order;
/// the scheduled player sorts timed entries itself.
pub fn load_schedule(path: impl AsRef<Path>) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let contents = std::fs::read_to_string(path)?;
    let raw: Vec<RawEntry> = serde_json::from_str(&contents)?;

    let mut entries = Vec::with_capacity(raw.len());
    for (index, entry) in raw.into_iter().enumerate() {
        let cue = match (&entry.time, entry.index) {
            (Some(time), _) => Cue::At(parse_compact_time(time)?),
            (None, Some(slot)) => Cue::Index(slot),
            (None, None) => {
                return Err(ScheduleError::MissingCue {
                    index,
                    filename: entry.filename,
                })
            }
        };
        entries.push(ScheduleEntry {
            filename: entry.filename,
            cue,
        });
    }

    info!("loaded {} schedule entries", entries.len());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_compact_time() {
        let parsed = parse_compact_time("20250525180000").unwrap();
        assert_eq!(18, parsed.hour());
        assert_eq!(0, parsed.minute());
    }

    #[test]
    fn test_parse_compact_time_rejects_malformed_values() {
        for value in ["2025052518000", "20250525180000Z", "20251325180000", ""] {
            assert!(matches!(
                parse_compact_time(value),
                Err(ScheduleError::InvalidTimeFormat { .. })
            ));
        }
    }

    #[test]
    fn test_load_schedule_with_times_and_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(
            &path,
            r#"[
                { "filename": "opening.bin", "time": "20250525180000" },
                { "filename": "finale.bin", "index": 1 }
            ]"#,
        )
        .unwrap();

        let entries = load_schedule(&path).unwrap();
        assert_eq!(2, entries.len());
        assert_eq!("opening.bin", entries[0].filename);
        assert!(matches!(entries[0].cue, Cue::At(_)));
        assert_eq!(Cue::Index(1), entries[1].cue);
    }

    #[test]
    fn test_load_schedule_rejects_entry_without_cue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, r#"[ { "filename": "lost.bin" } ]"#).unwrap();

        assert!(matches!(
            load_schedule(&path),
            Err(ScheduleError::MissingCue { index: 0, .. })
        ));
    }
}
