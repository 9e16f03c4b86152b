use serde::Serialize;

use crate::models::{Division, Image, Os, RuntimeLog, SnapshotSet, Team, TeamSnapshot, Tier};
use crate::services::scoring::{self, Band, ChartPoint};

#[derive(Debug, Clone, Serialize)]
pub struct ImageSlot {
    pub os: Os,
    pub image: Option<Image>,
    pub stopped: bool,
    /// `None` when the source sent nothing for this category.
    pub band: Option<Band>,
    pub runtime_label: String,
    pub score_label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamBoard {
    pub team: Team,
    pub display_name: String,
    pub total_score: Option<f64>,
    pub images: Vec<ImageSlot>,
    pub national: String,
    pub state: String,
    pub location: String,
    pub division: Option<Division>,
    pub tier: Option<Tier>,
    pub history: Vec<ChartPoint>,
    pub has_data: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Board {
    /// Sorted by total score, teams without data last, ties in roster order.
    pub leaderboard: Vec<TeamBoard>,
}

impl Board {
    pub fn team(&self, team_id: &str) -> Option<&TeamBoard> {
        self.leaderboard.iter().find(|row| row.team.id == team_id)
    }
}

pub fn display_name(team: &Team) -> String {
    team.alias
        .clone()
        .unwrap_or_else(|| format!("Team {}", team.id))
}

fn image_slot(
    os: Os,
    snapshot: Option<&TeamSnapshot>,
    runtime_log: &RuntimeLog,
    team_id: &str,
) -> ImageSlot {
    let image = snapshot.and_then(|snapshot| snapshot.image(os));
    let stopped = scoring::is_stopped(snapshot, runtime_log.get(team_id), image);
    ImageSlot {
        os,
        image: image.cloned(),
        stopped,
        band: image.map(|image| scoring::band(image.runtime, stopped)),
        runtime_label: scoring::format_runtime(image.map(|image| image.runtime)),
        score_label: scoring::format_score(image.map(|image| image.score)),
    }
}

pub fn build_team_board(
    team: &Team,
    snapshot: Option<&TeamSnapshot>,
    runtime_log: &RuntimeLog,
) -> TeamBoard {
    let images = Os::DISPLAY_ORDER
        .iter()
        .map(|os| image_slot(*os, snapshot, runtime_log, &team.id))
        .collect();
    let ranking = snapshot.map(|snapshot| snapshot.ranking).unwrap_or_default();
    let history = snapshot
        .map(|snapshot| scoring::prepare_history(&scoring::dedup_history(&snapshot.history)))
        .unwrap_or_default();

    TeamBoard {
        team: team.clone(),
        display_name: display_name(team),
        total_score: scoring::total_score(snapshot),
        images,
        national: scoring::format_percentile(ranking.national.as_ref()),
        state: scoring::format_percentile(ranking.state.as_ref()),
        location: snapshot
            .and_then(|snapshot| snapshot.location.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        division: snapshot.and_then(|snapshot| snapshot.division),
        tier: snapshot.and_then(|snapshot| snapshot.tier),
        history,
        has_data: snapshot.is_some(),
    }
}

/// Derives the board for every roster team. The runtime log must already include `snapshots`.
pub fn build_board(teams: &[Team], snapshots: &SnapshotSet, runtime_log: &RuntimeLog) -> Board {
    let mut leaderboard: Vec<TeamBoard> = teams
        .iter()
        .map(|team| {
            let snapshot = snapshots.get(&team.id).and_then(Option::as_ref);
            build_team_board(team, snapshot, runtime_log)
        })
        .collect();
    scoring::rank_by_score(&mut leaderboard, |row| row.total_score);
    Board { leaderboard }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Slide {
    Overview,
    Team(String),
}

/// Rotating detail view: the overview first, then one slide per team in id order.
#[derive(Debug, Clone)]
pub struct SlideDeck {
    slides: Vec<Slide>,
    index: usize,
}

impl Default for SlideDeck {
    fn default() -> Self {
        Self {
            slides: vec![Slide::Overview],
            index: 0,
        }
    }
}

fn numeric_id(team_id: &str) -> u64 {
    team_id.replace('-', "").parse().unwrap_or(u64::MAX)
}

impl SlideDeck {
    pub fn new(teams: &[Team]) -> Self {
        let mut deck = Self::default();
        deck.rebuild(teams);
        deck
    }

    /// Replaces the team slides, staying on the current slide when it still exists.
    pub fn rebuild(&mut self, teams: &[Team]) {
        let current = self.current().clone();
        let mut team_ids: Vec<&str> = teams.iter().map(|team| team.id.as_str()).collect();
        team_ids.sort_by_key(|id| numeric_id(id));

        self.slides = std::iter::once(Slide::Overview)
            .chain(team_ids.into_iter().map(|id| Slide::Team(id.to_string())))
            .collect();
        self.index = self
            .slides
            .iter()
            .position(|slide| *slide == current)
            .unwrap_or(0);
    }

    pub fn current(&self) -> &Slide {
        &self.slides[self.index]
    }

    pub fn advance(&mut self) -> &Slide {
        self.index = (self.index + 1) % self.slides.len();
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ranking, Rankings, RuntimeLogEntry};
    use chrono::{Duration, TimeZone, Utc};

    fn team(id: &str, alias: Option<&str>) -> Team {
        Team {
            id: id.to_string(),
            alias: alias.map(str::to_string),
        }
    }

    fn image(os: Os, runtime: i64, score: f64) -> Image {
        Image {
            os: Some(os),
            runtime,
            score,
            ..Default::default()
        }
    }

    #[test]
    fn leaderboard_orders_by_total() {
        let updated = Utc.with_ymd_and_hms(2024, 1, 20, 15, 0, 0).unwrap();
        let teams = vec![
            team("15-0001", None),
            team("15-0002", Some("Zeros")),
            team("15-0003", None),
            team("15-0004", None),
        ];
        let mut snapshots = SnapshotSet::new();
        snapshots.insert(
            "15-0001".to_string(),
            Some(TeamSnapshot {
                images: vec![image(Os::Windows, 10, 0.0)],
                updated: Some(updated),
                ..Default::default()
            }),
        );
        snapshots.insert("15-0002".to_string(), None);
        snapshots.insert(
            "15-0003".to_string(),
            Some(TeamSnapshot {
                images: vec![
                    image(Os::Windows, 10, 50.0),
                    image(Os::Server, 10, 30.0),
                    image(Os::Linux, 10, 20.0),
                ],
                updated: Some(updated),
                ..Default::default()
            }),
        );

        let board = build_board(&teams, &snapshots, &RuntimeLog::new());
        let order: Vec<&str> = board
            .leaderboard
            .iter()
            .map(|row| row.team.id.as_str())
            .collect();
        assert_eq!(order, ["15-0003", "15-0001", "15-0002", "15-0004"]);
        assert_eq!(board.leaderboard[0].total_score, Some(100.0));
        assert!(!board.team("15-0002").unwrap().has_data);
        assert_eq!(board.team("15-0002").unwrap().display_name, "Zeros");
        assert_eq!(board.team("15-0004").unwrap().display_name, "Team 15-0004");
    }

    #[test]
    fn team_board_fills_slots_in_display_order() {
        let updated = Utc.with_ymd_and_hms(2024, 1, 20, 15, 10, 0).unwrap();
        let snapshot = TeamSnapshot {
            images: vec![image(Os::Linux, 351, 12.0), image(Os::Windows, 200, 40.0)],
            ranking: Rankings {
                national: Some(Ranking {
                    place: 1,
                    total: 100,
                }),
                state: None,
            },
            updated: Some(updated),
            ..Default::default()
        };
        let mut log = RuntimeLog::new();
        log.entry("15-0001".to_string()).or_default().insert(
            Os::Windows,
            RuntimeLogEntry {
                runtime: 200,
                since: updated - Duration::minutes(5),
            },
        );

        let row = build_team_board(&team("15-0001", None), Some(&snapshot), &log);
        let oses: Vec<Os> = row.images.iter().map(|slot| slot.os).collect();
        assert_eq!(oses, Os::DISPLAY_ORDER);

        assert!(row.images[0].stopped);
        assert_eq!(row.images[0].band, Some(Band::Stopped));
        assert_eq!(row.images[0].runtime_label, "3:20");
        assert_eq!(row.images[1].band, None);
        assert_eq!(row.images[1].runtime_label, "--:--");
        assert_eq!(row.images[1].score_label, "--");
        assert_eq!(row.images[2].band, Some(Band::CriticalSolid));
        assert_eq!(row.national, "99th Percentile");
        assert_eq!(row.state, "Rank Unavailable");
        assert_eq!(row.location, "Unknown");
    }

    #[test]
    fn slides_follow_numeric_id_order() {
        let teams = vec![team("16-0002", None), team("15-0010", None), team("15-0002", None)];
        let mut deck = SlideDeck::new(&teams);
        assert_eq!(
            deck.slides,
            [
                Slide::Overview,
                Slide::Team("15-0002".to_string()),
                Slide::Team("15-0010".to_string()),
                Slide::Team("16-0002".to_string()),
            ]
        );

        assert_eq!(deck.advance(), &Slide::Team("15-0002".to_string()));
        deck.advance();
        deck.advance();
        assert_eq!(deck.advance(), &Slide::Overview);
    }

    #[test]
    fn rebuild_keeps_current_slide_or_resets() {
        let mut deck = SlideDeck::new(&[team("15-0001", None), team("15-0002", None)]);
        deck.advance();
        deck.advance();
        assert_eq!(deck.current(), &Slide::Team("15-0002".to_string()));

        deck.rebuild(&[team("15-0002", None), team("15-0003", None)]);
        assert_eq!(deck.current(), &Slide::Team("15-0002".to_string()));

        deck.rebuild(&[team("15-0003", None)]);
        assert_eq!(deck.current(), &Slide::Overview);
    }

    #[test]
    fn empty_roster_deck_is_overview_only() {
        let mut deck = SlideDeck::new(&[]);
        assert_eq!(deck.advance(), &Slide::Overview);
    }
}
