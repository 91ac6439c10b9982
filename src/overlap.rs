//! The time-bucket overlap algebra: given a set of files at mixed
//! granularities, determine which are made redundant by a strictly coarser
//! file that fully covers their time range.
//!
//! This is a reimplementation of the cascade in the original Python
//! `compute_overlap`, with one deliberate correction: the original has a
//! duplicate `elif f.tl == 'M':` branch that shadows the intended quarter
//! handling, so every quarter-granularity file is silently compared against
//! month buckets instead of quarter buckets. Quarter gets its own
//! first-class branch here.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::model::{FileDescriptor, Granularity};

/// Returns the subset of `files` that are covered by some strictly coarser
/// file in `files` spanning the same time bucket.
///
/// A file at granularity `g` with timestamp `t` is covered when `files`
/// contains a file at a coarser granularity whose bucket, computed at `g`'s
/// width, contains `t`.
pub fn compute_overlap(files: &HashSet<FileDescriptor>) -> HashSet<FileDescriptor> {
  let mut by_granularity: Vec<Vec<&FileDescriptor>> = vec![Vec::new(); 8];
  for f in files {
    by_granularity[granularity_rank(f.granularity)].push(f);
  }

  let mut overlapped = HashSet::new();

  for f in files {
    let coarser_covers = match f.granularity {
      Granularity::Year => false,
      Granularity::Quarter => covered_by(&by_granularity, Granularity::Year, |t| {
        year_bucket_contains(t, f.timestamp)
      }),
      Granularity::Month => {
        covered_by(&by_granularity, Granularity::Year, |t| {
          year_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Quarter, |t| {
          quarter_bucket_contains(t, f.timestamp)
        })
      }
      Granularity::Week => {
        covered_by(&by_granularity, Granularity::Year, |t| {
          year_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Quarter, |t| {
          quarter_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Month, |t| {
          month_bucket_contains(t, f.timestamp)
        })
      }
      Granularity::Day => {
        covered_by(&by_granularity, Granularity::Year, |t| {
          year_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Quarter, |t| {
          quarter_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Month, |t| {
          month_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Week, |t| {
          week_bucket_contains(t, f.timestamp)
        })
      }
      Granularity::Hour => {
        covered_by(&by_granularity, Granularity::Year, |t| {
          year_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Quarter, |t| {
          quarter_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Month, |t| {
          month_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Week, |t| {
          week_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Day, |t| {
          day_bucket_contains(t, f.timestamp)
        })
      }
      Granularity::TenMinute => {
        covered_by(&by_granularity, Granularity::Year, |t| {
          year_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Quarter, |t| {
          quarter_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Month, |t| {
          month_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Week, |t| {
          week_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Day, |t| {
          day_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Hour, |t| {
          hour_bucket_contains(t, f.timestamp)
        })
      }
      Granularity::Minute => {
        covered_by(&by_granularity, Granularity::Year, |t| {
          year_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Quarter, |t| {
          quarter_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Month, |t| {
          month_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Week, |t| {
          week_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Day, |t| {
          day_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::Hour, |t| {
          hour_bucket_contains(t, f.timestamp)
        }) || covered_by(&by_granularity, Granularity::TenMinute, |t| {
          ten_minute_bucket_contains(t, f.timestamp)
        })
      }
    };

    if coarser_covers {
      overlapped.insert(f.clone());
    }
  }

  overlapped
}

fn granularity_rank(g: Granularity) -> usize {
  match g {
    Granularity::Year => 0,
    Granularity::Quarter => 1,
    Granularity::Month => 2,
    Granularity::Week => 3,
    Granularity::Day => 4,
    Granularity::Hour => 5,
    Granularity::TenMinute => 6,
    Granularity::Minute => 7,
  }
}

fn covered_by(
  by_granularity: &[Vec<&FileDescriptor>],
  granularity: Granularity,
  contains: impl Fn(NaiveDateTime) -> bool,
) -> bool {
  by_granularity[granularity_rank(granularity)]
    .iter()
    .any(|f| contains(f.timestamp))
}

fn year_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  bucket_start.year() == t.year()
}

fn quarter_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  bucket_start.year() == t.year() && quarter_of(bucket_start.month()) == quarter_of(t.month())
}

fn quarter_of(month: u32) -> u32 {
  (month - 1) / 3
}

fn month_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  bucket_start.year() == t.year() && bucket_start.month() == t.month()
}

/// Week buckets are aligned to day-of-month anchors {1, 8, 15, 22}, each
/// spanning up to the next anchor or month end — matching the original's
/// fixed four-bucket-per-month scheme rather than ISO week numbering.
fn week_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  if bucket_start.year() != t.year() || bucket_start.month() != t.month() {
    return false;
  }
  week_anchor(bucket_start.day()) == week_anchor(t.day())
}

fn week_anchor(day: u32) -> u32 {
  match day {
    1..=7 => 1,
    8..=14 => 8,
    15..=21 => 15,
    _ => 22,
  }
}

fn day_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  bucket_start.date() == t.date()
}

fn hour_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  bucket_start.date() == t.date() && bucket_start.hour() == t.hour()
}

/// Ten-minute buckets are aligned to minute anchors {00,10,...,50}.
fn ten_minute_bucket_contains(bucket_start: NaiveDateTime, t: NaiveDateTime) -> bool {
  bucket_start.date() == t.date()
    && bucket_start.hour() == t.hour()
    && bucket_start.minute() / 10 == t.minute() / 10
}
