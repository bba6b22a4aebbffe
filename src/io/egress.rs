//! Journey egress - writes reconstructed journeys to file
//!
//! Journeys are written in JSONL format (one JSON object per line)
//! to the file specified in config, in journey id order. Each run
//! replaces the file.

use crate::domain::journey::Journey;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Egress writer for journeys
pub struct Egress {
    file_path: String,
    include_unfinished: bool,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string(), include_unfinished: false }
    }

    /// Also write dead-end and budget-stopped journeys
    pub fn with_unfinished(mut self, include: bool) -> Self {
        self.include_unfinished = include;
        self
    }

    fn accepts(&self, journey: &Journey) -> bool {
        self.include_unfinished || journey.is_completed()
    }

    /// Write a whole batch, replacing any previous content of the file.
    /// Returns the number of journeys written.
    pub fn write_journeys<'a, I>(&self, journeys: I) -> std::io::Result<usize>
    where
        I: IntoIterator<Item = &'a Journey>,
    {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
        let mut out = BufWriter::new(file);
        let mut written = 0;
        for journey in journeys.into_iter().filter(|j| self.accepts(j)) {
            writeln!(out, "{}", journey.to_json())?;
            debug!(uid = %journey.id, outcome = %journey.outcome.as_str(), "journey_written");
            written += 1;
        }
        out.flush()?;

        info!(file = %self.file_path, journeys = %written, "journeys_egressed");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::journey::DeadEndReason;
    use crate::domain::types::{Direction, Event, LocalId};
    use std::fs;
    use tempfile::tempdir;

    fn completed(id: usize) -> Journey {
        let start = Event::new(1.0, Direction::Forward, "ip.in", "phy.out.proc")
            .with_local_id("id", LocalId::single(id.to_string()));
        let mut journey = Journey::new(id, &start, vec![0]);
        journey.id = id;
        journey.complete(1.0);
        journey
    }

    fn dead_end(id: usize) -> Journey {
        let start = Event::new(2.0, Direction::Forward, "ip.in", "pdcp.in");
        let mut journey = Journey::new(id, &start, vec![]);
        journey.id = id;
        journey.mark_dead_end(DeadEndReason::NoCandidate);
        journey
    }

    #[test]
    fn test_write_journeys() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("journeys.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        assert_eq!(egress.write_journeys(&[completed(3)]).unwrap(), 1);

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["uid"], 3);
        assert_eq!(parsed["dir"], "D");
        assert_eq!(parsed["out"], "completed");
        assert_eq!(parsed["path"], 0);
        assert_eq!(parsed["set"][0][2], "ip.in--phy.out.proc");
    }

    #[test]
    fn test_unfinished_filtered_by_default() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("journeys.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let journeys = vec![completed(0), dead_end(1), completed(2)];
        assert_eq!(egress.write_journeys(&journeys).unwrap(), 2);

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_include_unfinished() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("journeys.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap()).with_unfinished(true);

        let journeys = vec![completed(0), dead_end(1)];
        assert_eq!(egress.write_journeys(&journeys).unwrap(), 2);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<serde_json::Value> =
            content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines[1]["out"], "dead_end");
        assert!(lines[1].get("ts_out").is_none());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("journeys.jsonl");
        let egress = Egress::new(nested_path.to_str().unwrap());

        assert_eq!(egress.write_journeys(&[completed(0)]).unwrap(), 1);
        assert!(nested_path.exists());
    }

    #[test]
    fn test_rerun_replaces_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("journeys.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = Egress::new(file_path.to_str().unwrap());
        egress.write_journeys(&[completed(0)]).unwrap();
        egress.write_journeys(&[completed(0)]).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"uid\":0"));
    }
}
