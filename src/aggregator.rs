//! Per-minute step history
//!
//! Buckets the running step tally by wall-clock minute for the bar chart.
//! Rollover is detected on a heartbeat, not on step arrival, so a quiet
//! minute still produces a zero bucket.

use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SensingError;
use crate::types::MinuteBucket;

const SECONDS_PER_DAY: i32 = 86_400;

/// Chart configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Offset from UTC used to read the wall-clock minute
    pub utc_offset_minutes: i32,
}

impl ChartConfig {
    pub fn validate(&self) -> Result<(), SensingError> {
        self.offset().map(|_| ())
    }

    pub fn offset(&self) -> Result<FixedOffset, SensingError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .filter(|secs| secs.abs() < SECONDS_PER_DAY)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                SensingError::InvalidConfig(format!(
                    "utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

/// Wall-clock minute buckets for one session
#[derive(Debug, Clone)]
pub struct MinuteAggregator {
    offset: FixedOffset,
    last_minute: Option<u32>,
    buckets: Vec<MinuteBucket>,
}

impl MinuteAggregator {
    /// Aggregator that adopts the minute of its first tick
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            last_minute: None,
            buckets: Vec::new(),
        }
    }

    pub fn starting_at(offset: FixedOffset, start_ms: i64) -> Self {
        let mut aggregator = Self::new(offset);
        aggregator.start(start_ms);
        aggregator
    }

    /// Drop any history and track from `start_ms`; the first bucket closes
    /// when the minute changes
    pub fn start(&mut self, start_ms: i64) {
        self.buckets.clear();
        self.last_minute = self.minute_of_hour(start_ms);
    }

    /// Heartbeat. Returns the closed bucket when the minute has changed; the
    /// caller must then reset its in-progress tally to zero.
    pub fn on_tick(&mut self, now_ms: i64, current_tally: u64) -> Option<MinuteBucket> {
        let minute = self.minute_of_hour(now_ms)?;

        let previous = match self.last_minute {
            Some(previous) => previous,
            None => {
                self.last_minute = Some(minute);
                return None;
            }
        };

        if minute == previous {
            return None;
        }

        let bucket = MinuteBucket {
            minute_label: format!("{:02}", previous),
            step_count: current_tally,
        };
        debug!(
            minute = %bucket.minute_label,
            steps = current_tally,
            "minute closed"
        );
        self.buckets.push(bucket.clone());
        self.last_minute = Some(minute);
        Some(bucket)
    }

    fn minute_of_hour(&self, timestamp_ms: i64) -> Option<u32> {
        match DateTime::from_timestamp_millis(timestamp_ms) {
            Some(utc) => Some(utc.with_timezone(&self.offset).minute()),
            None => {
                warn!(timestamp_ms, "timestamp outside the representable range");
                None
            }
        }
    }

    /// Closed buckets, oldest first
    pub fn buckets(&self) -> &[MinuteBucket] {
        &self.buckets
    }

    /// Sum over all closed buckets
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|b| b.step_count).sum()
    }

    pub fn last_minute(&self) -> Option<u32> {
        self.last_minute
    }
}
