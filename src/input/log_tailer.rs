//! Tailer over the durable CSV login log.
//!
//! The append log has the columns `ts,user,device,ip,country,success`
//! with timestamps formatted as `YYYY-MM-DD HH:MM:SS` (UTC) and success
//! encoded as 1/0. Malformed lines are skipped and counted, never fatal.

use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::models::{EventRecord, Outcome};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from the log input layer
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed log line: {0}")]
    Malformed(String),

    #[error("Reader not initialized")]
    NotInitialized,
}

/// Tails the login log and parses new rows into event records
pub struct LoginLogTailer {
    file_path: PathBuf,
    reader: Option<BufReader<File>>,
    skipped_lines: u64,
}

impl LoginLogTailer {
    pub fn new(file_path: PathBuf) -> Self {
        LoginLogTailer {
            file_path,
            reader: None,
            skipped_lines: 0,
        }
    }

    /// Open the file; with `from_start` false, seek to the end and only
    /// report rows appended afterwards
    pub fn initialize(&mut self, from_start: bool) -> Result<(), InputError> {
        let file = File::open(&self.file_path)?;
        let mut reader = BufReader::new(file);
        if !from_start {
            reader.seek(SeekFrom::End(0))?;
        }
        self.reader = Some(reader);
        Ok(())
    }

    /// Read all currently available new rows
    pub fn read_events(&mut self) -> Result<Vec<EventRecord>, InputError> {
        let reader = self.reader.as_mut().ok_or(InputError::NotInitialized)?;
        let mut events = Vec::new();

        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break; // EOF, more may be appended later
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || is_header(trimmed) {
                continue;
            }
            match parse_line(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    self.skipped_lines += 1;
                    log::debug!("Skipping log line: {}", e);
                }
            }
        }

        Ok(events)
    }

    /// Lines skipped as malformed since creation
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    pub fn is_valid(&self) -> bool {
        self.file_path.exists()
    }
}

/// Read and parse a whole log file at once (offline batch scans).
/// Returns the parsed events and the number of skipped lines.
pub fn read_log_file<P: AsRef<Path>>(path: P) -> Result<(Vec<EventRecord>, u64), InputError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut skipped = 0u64;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || is_header(trimmed) {
            continue;
        }
        match parse_line(trimmed) {
            Ok(event) => events.push(event),
            Err(e) => {
                skipped += 1;
                log::debug!("Skipping log line: {}", e);
            }
        }
    }

    Ok((events, skipped))
}

fn is_header(line: &str) -> bool {
    line.starts_with("ts,")
}

/// Parse one CSV row into an event record
pub fn parse_line(line: &str) -> Result<EventRecord, InputError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(InputError::Malformed(format!(
            "expected 6 fields, got {}: {}",
            fields.len(),
            line
        )));
    }

    let timestamp = NaiveDateTime::parse_from_str(fields[0], TS_FORMAT)
        .map_err(|e| InputError::Malformed(format!("bad timestamp '{}': {}", fields[0], e)))?
        .and_utc();
    let account_id = fields[1].to_string();
    let device_id = (!fields[2].is_empty()).then(|| fields[2].to_string());
    let source_ip = IpAddr::from_str(fields[3])
        .map_err(|_| InputError::Malformed(format!("bad IP address '{}'", fields[3])))?;
    let country_code = (!fields[4].is_empty()).then(|| fields[4].to_string());
    let outcome = match fields[5] {
        "1" => Outcome::Success,
        "0" => Outcome::Failure,
        other => {
            return Err(InputError::Malformed(format!(
                "bad success flag '{}'",
                other
            )))
        }
    };

    Ok(EventRecord::new(
        timestamp,
        account_id,
        device_id,
        source_ip,
        country_code,
        outcome,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    #[test]
    fn test_parse_full_row() {
        let event = parse_line("2023-04-13 10:00:00,alice,dev_7,192.168.1.100,DE,1").unwrap();
        assert_eq!(event.account_id, "alice");
        assert_eq!(event.device_id, Some("dev_7".to_string()));
        assert_eq!(event.source_ip.to_string(), "192.168.1.100");
        assert_eq!(event.country_code, Some("DE".to_string()));
        assert_eq!(event.outcome, Outcome::Success);
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2023, 4, 13, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_unknown_fields() {
        let event = parse_line("2023-04-13 10:00:00,alice,,10.0.0.1,,0").unwrap();
        assert_eq!(event.device_id, None);
        assert_eq!(event.country_code, None);
        assert_eq!(event.outcome, Outcome::Failure);
    }

    #[test]
    fn test_malformed_lines_rejected() {
        assert!(parse_line("not,a,row").is_err());
        assert!(parse_line("yesterday,alice,dev,1.1.1.1,DE,1").is_err());
        assert!(parse_line("2023-04-13 10:00:00,alice,dev,not-an-ip,DE,1").is_err());
        assert!(parse_line("2023-04-13 10:00:00,alice,dev,1.1.1.1,DE,maybe").is_err());
    }

    #[test]
    fn test_read_log_file_skips_header_and_bad_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts,user,device,ip,country,success").unwrap();
        writeln!(file, "2023-04-13 10:00:00,alice,dev_1,1.1.1.1,DE,1").unwrap();
        writeln!(file, "garbage line").unwrap();
        writeln!(file, "2023-04-13 10:00:30,bob,dev_2,2.2.2.2,FR,0").unwrap();
        file.flush().unwrap();

        let (events, skipped) = read_log_file(file.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(events[0].account_id, "alice");
        assert_eq!(events[1].outcome, Outcome::Failure);
    }

    #[test]
    fn test_tailer_sees_only_appended_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts,user,device,ip,country,success").unwrap();
        writeln!(file, "2023-04-13 10:00:00,old,dev_1,1.1.1.1,DE,1").unwrap();
        file.flush().unwrap();

        let mut tailer = LoginLogTailer::new(file.path().to_path_buf());
        tailer.initialize(false).unwrap();
        assert!(tailer.read_events().unwrap().is_empty());

        writeln!(file, "2023-04-13 10:01:00,new,dev_2,2.2.2.2,FR,1").unwrap();
        file.flush().unwrap();

        let events = tailer.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].account_id, "new");
    }

    #[test]
    fn test_tailer_from_start_counts_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ts,user,device,ip,country,success").unwrap();
        writeln!(file, "2023-04-13 10:00:00,alice,dev_1,1.1.1.1,DE,1").unwrap();
        writeln!(file, "broken").unwrap();
        file.flush().unwrap();

        let mut tailer = LoginLogTailer::new(file.path().to_path_buf());
        tailer.initialize(true).unwrap();
        let events = tailer.read_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(tailer.skipped_lines(), 1);
    }
}
