use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::models::{HasId, Team};

const ROSTER_FILE: &str = "teams.json";

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Invalid team ID: {0}")]
    InvalidTeamId(String),
    #[error("Team already added: {0}")]
    DuplicateTeam(String),
    #[error("failed to access roster {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse roster {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Team ids look like `15-0001`: two digits, a dash, four digits.
pub fn validate_team_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 7
        && bytes[2] == b'-'
        && bytes[..2].iter().all(u8::is_ascii_digit)
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

/// Ordered list of registered teams. Insertion order is the leaderboard tiebreak.
#[derive(Debug, Default)]
pub struct Roster {
    path: PathBuf,
    teams: Vec<Team>,
}

impl Roster {
    pub fn load(state_dir: &Path) -> Result<Self, RosterError> {
        let path = state_dir.join(ROSTER_FILE);
        let teams = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Vec<Team>>(&raw).map_err(|source| {
                RosterError::Serde {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(RosterError::Io { path, source }),
        };
        info!("Loaded {} teams from {}", teams.len(), path.display());
        Ok(Self { path, teams })
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn get(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|team| team.id() == id)
    }

    pub fn add(&mut self, id: &str, alias: Option<&str>) -> Result<&Team, RosterError> {
        let id = id.trim();
        if !validate_team_id(id) {
            return Err(RosterError::InvalidTeamId(id.to_string()));
        }
        if self.get(id).is_some() {
            return Err(RosterError::DuplicateTeam(id.to_string()));
        }

        let alias = alias
            .map(str::trim)
            .filter(|alias| !alias.is_empty())
            .map(str::to_string);
        self.teams.push(Team {
            id: id.to_string(),
            alias,
        });
        info!("Added team {}", id);
        Ok(&self.teams[self.teams.len() - 1])
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.teams.len();
        self.teams.retain(|team| team.id() != id);
        let removed = self.teams.len() != before;
        if removed {
            info!("Removed team {}", id);
        }
        removed
    }

    pub fn save(&self) -> Result<(), RosterError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| RosterError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let encoded =
            serde_json::to_string_pretty(&self.teams).map_err(|source| RosterError::Serde {
                path: self.path.clone(),
                source,
            })?;
        fs::write(&self.path, encoded).map_err(|source| RosterError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
