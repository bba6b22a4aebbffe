//! Event source - reads pre-parsed events from JSON Lines
//!
//! One event object per line. Blank lines are ignored, lines that fail to
//! decode are skipped with a warning so a single corrupt record does not
//! abort a whole batch.

use crate::domain::types::Event;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Decoded events plus the number of rejected lines
#[derive(Debug, Default)]
pub struct EventBatch {
    pub events: Vec<Event>,
    pub skipped_lines: usize,
}

/// Read every event of a JSONL file
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<EventBatch> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open events file: {}", path.display()))?;
    let batch = parse_events(BufReader::new(file))
        .with_context(|| format!("Failed to read events file: {}", path.display()))?;
    info!(
        file = %path.display(),
        events = %batch.events.len(),
        skipped = %batch.skipped_lines,
        "events_loaded"
    );
    Ok(batch)
}

/// Decode events from any buffered reader
pub fn parse_events<R: BufRead>(reader: R) -> Result<EventBatch> {
    let mut batch = EventBatch::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("I/O error at line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(trimmed) {
            Ok(event) => batch.events.push(event),
            Err(e) => {
                warn!(line = %(line_no + 1), error = %e, "event_line_skipped");
                batch.skipped_lines += 1;
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Direction, LocalId};
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_events() {
        let input = r#"{"timestamp":1.5,"direction":"forward","src_point":"ip.in","dst_point":"pdcp.in","local_ids":{"id":"7"}}

{"timestamp":2.0,"direction":"D","src_point":"pdcp.in","dst_point":"rlc.in","local_ids":{"sn":[1,2]},"global_ids":{"rnti":"4601"}}
"#;
        let batch = parse_events(Cursor::new(input)).unwrap();

        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.skipped_lines, 0);
        assert_eq!(batch.events[0].direction, Direction::Forward);
        assert_eq!(batch.events[0].local_ids["id"], LocalId::single("7"));
        assert_eq!(batch.events[1].local_ids["sn"], LocalId::multiple(["1", "2"]));
        assert_eq!(batch.events[1].global_ids["rnti"], "4601");
    }

    #[test]
    fn test_corrupt_lines_skipped() {
        let input = "not json\n{\"timestamp\":1.0,\"direction\":\"forward\",\"src_point\":\"a\",\"dst_point\":\"b\"}\n{\"timestamp\":\"x\"}\n";
        let batch = parse_events(Cursor::new(input)).unwrap();

        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.skipped_lines, 2);
    }

    #[test]
    fn test_read_events_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"timestamp":0.0,"direction":"uplink","src_point":"phy.start","dst_point":"mac.rx"}}"#
        )
        .unwrap();
        file.flush().unwrap();

        let batch = read_events(file.path()).unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].direction, Direction::Reverse);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = read_events("/nonexistent/events.jsonl").unwrap_err();
        assert!(err.to_string().contains("Failed to open events file"));
    }
}
