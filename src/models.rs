use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Windows,
    Server,
    Linux,
}

impl Os {
    /// Order in which image slots are shown on a team card.
    pub const DISPLAY_ORDER: [Os; 3] = [Os::Windows, Os::Server, Os::Linux];

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Windows => "Windows",
            Os::Server => "Server",
            Os::Linux => "Linux",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Platinum,
    Gold,
    Silver,
    HighSchool,
    MiddleSchool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Division {
    AllService,
    Open,
    MiddleSchool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Issues {
    pub found: u32,
    pub remaining: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Image {
    pub os: Option<Os>,
    /// Seconds on the image clock. Stays constant once the scoring agent stops reporting.
    #[serde(deserialize_with = "null_as_default")]
    pub runtime: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub issues: Issues,
    #[serde(deserialize_with = "null_as_default")]
    pub penalties: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub multiple: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub overtime: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Ranking {
    #[serde(deserialize_with = "null_as_default")]
    pub place: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Rankings {
    pub national: Option<Ranking>,
    pub state: Option<Ranking>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryElement {
    pub time: DateTime<Utc>,
    /// Score per image category at `time`. Keys that are not a known OS are ignored.
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: HashMap<String, Option<f64>>,
}

impl HistoryElement {
    pub fn score_for(&self, os: Os) -> Option<f64> {
        self.images.get(os.as_str()).copied().flatten()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TeamSnapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    #[serde(deserialize_with = "null_as_default")]
    pub ranking: Rankings,
    #[serde(deserialize_with = "null_as_default")]
    pub history: Vec<HistoryElement>,
    /// Time origin for every staleness computation on this snapshot.
    pub updated: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub division: Option<Division>,
    pub tier: Option<Tier>,
    pub runtime: Option<i64>,
}

impl TeamSnapshot {
    /// First image reported for `os`; the source sends at most one per category.
    pub fn image(&self, os: Os) -> Option<&Image> {
        self.images.iter().find(|image| image.os == Some(os))
    }
}

/// One poll response: team id to snapshot, `None` when the source does not know the team.
pub type SnapshotSet = HashMap<String, Option<TeamSnapshot>>;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLogEntry {
    pub runtime: i64,
    /// Earliest `updated` time at which `runtime` was observed with its current value.
    pub since: DateTime<Utc>,
}

pub type TeamRuntimeLog = BTreeMap<Os, RuntimeLogEntry>;

pub type RuntimeLog = BTreeMap<String, TeamRuntimeLog>;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let opt = Option::<T>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

pub trait HasId {
    fn id(&self) -> &str;
}

impl HasId for Team {
    fn id(&self) -> &str {
        &self.id
    }
}
