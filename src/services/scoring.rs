use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::models::{HistoryElement, Image, Os, Ranking, TeamRuntimeLog, TeamSnapshot};

pub const RANK_UNAVAILABLE: &str = "Rank Unavailable";

/// Whole minutes a runtime has to stay unchanged before the image counts as stopped.
/// Elapsed time is truncated to whole minutes, so the effective cutoff is 120 seconds.
pub const STALE_THRESHOLD_MINUTES: i64 = 1;

pub const WARNING_BLINK_AT: i64 = 345;
pub const CRITICAL_SOLID_AT: i64 = 350;
pub const CRITICAL_SEVERE_AT: i64 = 355;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    Stopped,
    Normal,
    WarningBlink,
    CriticalSolid,
    CriticalSevere,
}

impl Band {
    /// Bands that alternate on and off while the clock is still running.
    pub fn pulses(&self) -> bool {
        !matches!(self, Band::Stopped | Band::Normal)
    }
}

/// Sum of all image scores, `None` when there is nothing to add up.
pub fn total_score(snapshot: Option<&TeamSnapshot>) -> Option<f64> {
    let snapshot = snapshot?;
    if snapshot.images.is_empty() {
        return None;
    }
    Some(snapshot.images.iter().map(|image| image.score).sum())
}

/// Leaderboard sort key. Teams without data use -1 so they sink below a real zero.
pub fn sort_key(total: Option<f64>) -> f64 {
    total.unwrap_or(-1.0)
}

/// Stable descending sort, equal keys keep their input (roster) order.
pub fn rank_by_score<T>(entries: &mut [T], total: impl Fn(&T) -> Option<f64>) {
    entries.sort_by(|a, b| sort_key(total(b)).total_cmp(&sort_key(total(a))));
}

pub fn percentile(ranking: &Ranking) -> Option<i64> {
    if ranking.total <= 0 {
        warn!("Ranking total {} is not positive", ranking.total);
        return None;
    }
    let place = if (1..=ranking.total).contains(&ranking.place) {
        ranking.place
    } else {
        warn!(
            "Ranking place {} outside 1..={}, clamping",
            ranking.place, ranking.total
        );
        ranking.place.clamp(1, ranking.total)
    };
    // Widened so huge totals cannot overflow; the result is always below 100.
    let scaled = 100 * i128::from(ranking.total - place);
    Some(scaled.div_euclid(i128::from(ranking.total)) as i64)
}

pub fn ordinal_suffix(n: i64) -> &'static str {
    let v = n.rem_euclid(100);
    if (11..=13).contains(&v) {
        return "th";
    }
    match v % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

pub fn format_percentile(ranking: Option<&Ranking>) -> String {
    match ranking.and_then(percentile) {
        Some(value) => format!("{}{} Percentile", value, ordinal_suffix(value)),
        None => RANK_UNAVAILABLE.to_string(),
    }
}

/// An image is stopped once its runtime has not moved for longer than the stale threshold,
/// measured against the snapshot's own `updated` time.
pub fn is_stopped(
    snapshot: Option<&TeamSnapshot>,
    team_log: Option<&TeamRuntimeLog>,
    image: Option<&Image>,
) -> bool {
    let (Some(snapshot), Some(team_log), Some(image)) = (snapshot, team_log, image) else {
        return false;
    };
    let (Some(os), Some(updated)) = (image.os, snapshot.updated) else {
        return false;
    };
    let Some(entry) = team_log.get(&os) else {
        return false;
    };

    entry.runtime == image.runtime
        && (updated - entry.since).num_minutes() > STALE_THRESHOLD_MINUTES
}

pub fn band(runtime: i64, stopped: bool) -> Band {
    if stopped {
        Band::Stopped
    } else if runtime < WARNING_BLINK_AT {
        Band::Normal
    } else if runtime < CRITICAL_SOLID_AT {
        Band::WarningBlink
    } else if runtime < CRITICAL_SEVERE_AT {
        Band::CriticalSolid
    } else {
        Band::CriticalSevere
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Epoch milliseconds.
    pub time: i64,
    #[serde(rename = "Windows")]
    pub windows: Option<f64>,
    #[serde(rename = "Server")]
    pub server: Option<f64>,
    #[serde(rename = "Linux")]
    pub linux: Option<f64>,
}

impl ChartPoint {
    pub fn value(&self, os: Os) -> Option<f64> {
        match os {
            Os::Windows => self.windows,
            Os::Server => self.server,
            Os::Linux => self.linux,
        }
    }
}

/// Flattens history into chart rows. No padding, gaps stay `None`.
pub fn prepare_history(history: &[HistoryElement]) -> Vec<ChartPoint> {
    history
        .iter()
        .map(|element| ChartPoint {
            time: element.time.timestamp_millis(),
            windows: element.score_for(Os::Windows),
            server: element.score_for(Os::Server),
            linux: element.score_for(Os::Linux),
        })
        .collect()
}

/// Collapses elements sharing the same `time`.
/// The later element wins, the earlier position is kept.
pub fn dedup_history(history: &[HistoryElement]) -> Vec<HistoryElement> {
    let mut collapsed: Vec<HistoryElement> = Vec::with_capacity(history.len());
    for element in history {
        match collapsed.iter_mut().find(|seen| seen.time == element.time) {
            Some(seen) => *seen = element.clone(),
            None => collapsed.push(element.clone()),
        }
    }
    collapsed
}

pub fn format_runtime(runtime: Option<i64>) -> String {
    match runtime {
        Some(seconds) => format!("{}:{:02}", seconds / 60, seconds % 60),
        None => "--:--".to_string(),
    }
}

pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) if value.fract() == 0.0 => format!("{}", value as i64),
        Some(value) => format!("{value}"),
        None => "--".to_string(),
    }
}

pub fn format_history_label(time: DateTime<Utc>) -> String {
    time.format("%m/%d %-H:%M").to_string()
}
