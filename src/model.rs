//! The time-bucket data model: [`Granularity`], [`FileDescriptor`], parsing,
//! and the total order used for deterministic manifest output and the
//! overlap algorithm.

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::ParseError;

/// One of the eight time-bucket widths a file may be published at, in
/// coarsest-to-finest order. Declaration order doubles as rank order: the
/// derived [`Ord`] impl compares variants by discriminant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Granularity {
  Year,
  Quarter,
  Month,
  Week,
  Day,
  Hour,
  TenMinute,
  Minute,
}

impl Granularity {
  const LETTERS: [(char, Granularity); 8] = [
    ('Y', Granularity::Year),
    ('Q', Granularity::Quarter),
    ('M', Granularity::Month),
    ('W', Granularity::Week),
    ('D', Granularity::Day),
    ('H', Granularity::Hour),
    ('X', Granularity::TenMinute),
    ('m', Granularity::Minute),
  ];

  /// Parse the single-letter granularity code used in filenames.
  pub fn from_letter(letter: &str) -> Option<Granularity> {
    let mut chars = letter.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
      return None;
    }
    Self::LETTERS
      .iter()
      .find(|(l, _)| *l == c)
      .map(|(_, g)| *g)
  }

  /// The single-letter granularity code used in filenames.
  pub fn letter(self) -> char {
    Self::LETTERS
      .iter()
      .find(|(_, g)| *g == self)
      .map(|(l, _)| *l)
      .expect("all granularities have a letter")
  }
}

impl fmt::Display for Granularity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.letter())
  }
}

/// An immutable record describing one published fileset entry.
///
/// Equality and hashing are over `(granularity, timestamp, name)` only
/// (spec §3) — `directory` and `source_uri` are transport/placement detail
/// that must not affect set membership.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
  pub name: String,
  pub prefix: String,
  pub timestamp: NaiveDateTime,
  pub granularity: Granularity,
  pub extension: String,
  pub directory: Option<std::path::PathBuf>,
  pub source_uri: Option<String>,
}

impl FileDescriptor {
  /// Parse a basename of the form
  /// `{prefix}.{timestamp}.{granularity}.{extension}`.
  pub fn parse(name: &str) -> Result<FileDescriptor, ParseError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 4 {
      return Err(ParseError::MissingGranularity(name.to_string()));
    }

    let ext_idx = parts.len() - 1;
    let gran_idx = parts.len() - 2;

    let granularity = Granularity::from_letter(parts[gran_idx])
      .ok_or_else(|| ParseError::InvalidGranularity(parts[gran_idx].to_string()))?;

    let extension = parts[ext_idx].to_string();
    let prefix = parts[0].to_string();
    let timestamp_str = parts[1..gran_idx].join(".");

    let timestamp = parse_timestamp(&timestamp_str)
      .ok_or_else(|| ParseError::InvalidTimestamp(timestamp_str.clone()))?;

    Ok(FileDescriptor {
      name: name.to_string(),
      prefix,
      timestamp,
      granularity,
      extension,
      directory: None,
      source_uri: None,
    })
  }

  pub fn with_directory(mut self, directory: std::path::PathBuf) -> Self {
    self.directory = Some(directory);
    self
  }

  pub fn with_source_uri(mut self, uri: String) -> Self {
    self.source_uri = Some(uri);
    self
  }

  /// Full path on disk, joining `directory` and `name` when a directory is
  /// set, falling back to a bare relative path otherwise.
  pub fn path(&self) -> std::path::PathBuf {
    match &self.directory {
      Some(dir) => dir.join(&self.name),
      None => std::path::PathBuf::from(&self.name),
    }
  }
}

impl PartialEq for FileDescriptor {
  fn eq(&self, other: &Self) -> bool {
    self.granularity == other.granularity
      && self.timestamp == other.timestamp
      && self.name == other.name
  }
}

impl Eq for FileDescriptor {}

impl std::hash::Hash for FileDescriptor {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.granularity.hash(state);
    self.timestamp.hash(state);
    self.name.hash(state);
  }
}

impl PartialOrd for FileDescriptor {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for FileDescriptor {
  /// Total order: granularity rank, then timestamp ascending, then name.
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .granularity
      .cmp(&other.granularity)
      .then_with(|| self.timestamp.cmp(&other.timestamp))
      .then_with(|| self.name.cmp(&other.name))
  }
}

/// Parse a `YYYY`/`YYYYMM`/`YYYYMMDD`/`YYYYMMDD.HHMM` timestamp string. The
/// length of the string selects the format, matching the Python original's
/// `fmt_times` length-keyed dispatch.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
  match s.len() {
    13 => {
      let (date, time) = s.split_once('.')?;
      if date.len() != 8 || time.len() != 4 {
        return None;
      }
      let year: i32 = date[0..4].parse().ok()?;
      let month: u32 = date[4..6].parse().ok()?;
      let day: u32 = date[6..8].parse().ok()?;
      let hour: u32 = time[0..2].parse().ok()?;
      let minute: u32 = time[2..4].parse().ok()?;
      NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
    }
    8 => {
      let year: i32 = s[0..4].parse().ok()?;
      let month: u32 = s[4..6].parse().ok()?;
      let day: u32 = s[6..8].parse().ok()?;
      NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
    }
    6 => {
      let year: i32 = s[0..4].parse().ok()?;
      let month: u32 = s[4..6].parse().ok()?;
      NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
    }
    4 => {
      let year: i32 = s.parse().ok()?;
      NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_year() {
    let f = FileDescriptor::parse("test.2000.Y.txt").unwrap();
    assert_eq!(f.name, "test.2000.Y.txt");
    assert_eq!(f.granularity, Granularity::Year);
    assert_eq!(
      f.timestamp,
      NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
    );
  }

  #[test]
  fn parse_minute() {
    let f = FileDescriptor::parse("test.20000102.0304.m.txt").unwrap();
    assert_eq!(f.granularity, Granularity::Minute);
    assert_eq!(
      f.timestamp,
      NaiveDate::from_ymd_opt(2000, 1, 2)
        .unwrap()
        .and_hms_opt(3, 4, 0)
        .unwrap()
    );
  }

  #[test]
  fn parse_invalid_name() {
    assert!(FileDescriptor::parse("test.Y.txt").is_err());
    assert!(FileDescriptor::parse("test.200.Y.txt").is_err());
  }

  #[test]
  fn parse_invalid_granularity_letter() {
    assert!(FileDescriptor::parse("dns.2014.Z.mtbl").is_err());
  }

  #[test]
  fn parse_rejects_bad_lengths_and_values() {
    for bad in [
      "dns..Y.mtbl",
      "dns.2.Y.mtbl",
      "dns.20.Y.mtbl",
      "dns.200.Y.mtbl",
      "dns.20060.Y.mtbl",
      "dns.200600.Y.mtbl",
      "dns.200613.M.mtbl",
      "dns.2006010.D.mtbl",
      "dns.20060100.D.mtbl",
      "dns.20060132.D.mtbl",
      "dns.20060102.0150.H.mtbl",
      "dns.20060102.2500.H.mtbl",
      "dns.20060102.0060.H.mtbl",
    ] {
      assert!(FileDescriptor::parse(bad).is_err(), "expected error for {bad}");
    }
  }

  #[test]
  fn round_trip_every_granularity() {
    for name in [
      "dns.2014.Y.mtbl",
      "dns.201501.M.mtbl",
      "dns.20150201.W.mtbl",
      "dns.20150208.D.mtbl",
      "dns.20150209.0000.H.mtbl",
      "dns.20150209.0100.X.mtbl",
      "dns.20150209.0110.m.mtbl",
      "dns.201401.Q.mtbl",
    ] {
      let f = FileDescriptor::parse(name).unwrap();
      assert_eq!(f.name, name);
    }
  }

  #[test]
  fn ordering_is_coarsest_first() {
    let year = FileDescriptor::parse("test.2000.Y.txt").unwrap();
    let month_1999 = FileDescriptor::parse("test.199901.M.txt").unwrap();
    let month_2000 = FileDescriptor::parse("test.200001.M.txt").unwrap();

    assert!(year < month_1999);
    assert!(year < month_2000);
    assert!(month_1999 < month_2000);
    assert_eq!(year, FileDescriptor::parse("test.2000.Y.txt").unwrap());
  }

  #[test]
  fn hash_matches_equality() {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(f: &FileDescriptor) -> u64 {
      let mut hasher = DefaultHasher::new();
      f.hash(&mut hasher);
      hasher.finish()
    }

    let a = FileDescriptor::parse("test.2000.Y.txt").unwrap();
    let b = FileDescriptor::parse("test.2000.Y.txt").unwrap();
    let c = FileDescriptor::parse("test.200001.M.txt").unwrap();

    assert_eq!(hash_of(&a), hash_of(&b));
    assert_ne!(hash_of(&a), hash_of(&c));
  }

  #[test]
  fn equality_ignores_directory_and_uri() {
    let a = FileDescriptor::parse("test.2000.Y.txt").unwrap()
      .with_directory("/a".into())
      .with_source_uri("http://a/test.2000.Y.txt".to_string());
    let b = FileDescriptor::parse("test.2000.Y.txt").unwrap();
    assert_eq!(a, b);
  }
}
