use std::fmt::Write;

use chrono::DateTime;

use crate::models::Os;
use crate::services::board::{Board, ImageSlot, Slide, TeamBoard};
use crate::services::scoring::{self, Band};

fn slot_marker(slot: &ImageSlot) -> &'static str {
    match slot.band {
        Some(Band::Stopped) => "■",
        Some(band) if band.pulses() => "*",
        _ => "",
    }
}

fn slot_flags(slot: &ImageSlot) -> String {
    let mut flags = Vec::new();
    if let Some(image) = &slot.image {
        if image.overtime {
            flags.push("OVRT");
        }
        if image.multiple {
            flags.push("MULT");
        }
    }
    flags.join(" ")
}

fn render_row(out: &mut String, position: usize, row: &TeamBoard) {
    let clocks: Vec<String> = row
        .images
        .iter()
        .map(|slot| format!("{}{}", slot.runtime_label, slot_marker(slot)))
        .collect();
    let scores: Vec<&str> = row
        .images
        .iter()
        .map(|slot| slot.score_label.as_str())
        .collect();
    let _ = writeln!(
        out,
        "{:>3}. {} {:<32} {:>6}  {}  [{}]",
        position,
        row.team.id,
        row.team.alias.as_deref().unwrap_or(&row.team.id),
        scoring::format_score(row.total_score),
        scores.join(" / "),
        clocks.join(" "),
    );
}

pub fn render_leaderboard(board: &Board) -> String {
    let mut out = String::new();
    if board.leaderboard.is_empty() {
        out.push_str("No teams added yet\n");
        return out;
    }
    for (index, row) in board.leaderboard.iter().enumerate() {
        render_row(&mut out, index + 1, row);
    }
    out
}

fn render_team_detail(out: &mut String, row: &TeamBoard) {
    let _ = writeln!(out, "[{}] {}", row.team.id, row.display_name);
    if !row.has_data {
        out.push_str("Data Unavailable\n");
        return;
    }
    let _ = writeln!(out, "National  {}", row.national);
    let _ = writeln!(out, "State ({})  {}", row.location, row.state);
    if let (Some(division), Some(tier)) = (row.division, row.tier) {
        let _ = writeln!(out, "{:?} / {:?}", division, tier);
    }
    for slot in &row.images {
        let issues = slot
            .image
            .as_ref()
            .map(|image| {
                format!(
                    "{} found, {} left, -{}",
                    image.issues.found, image.issues.remaining, image.penalties
                )
            })
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:<8} {:>6} {:>6} {} {}{}",
            slot.os,
            slot.runtime_label,
            slot.score_label,
            issues,
            if slot.stopped { "stopped " } else { "" },
            slot_flags(slot),
        );
    }
    if let Some(last) = row.history.last() {
        let label = DateTime::from_timestamp_millis(last.time)
            .map(scoring::format_history_label)
            .unwrap_or_default();
        let values: Vec<String> = Os::DISPLAY_ORDER
            .iter()
            .map(|os| scoring::format_score(last.value(*os)))
            .collect();
        let _ = writeln!(out, "  {} {}", label, values.join(" / "));
    }
}

pub fn render_slide(board: &Board, slide: &Slide) -> String {
    let mut out = String::new();
    match slide {
        Slide::Overview => {
            out.push_str("Overview\n");
            out.push_str(&render_leaderboard(board));
        }
        Slide::Team(team_id) => match board.team(team_id) {
            Some(row) => render_team_detail(&mut out, row),
            None => {
                let _ = writeln!(out, "[{}] Data Unavailable", team_id);
            }
        },
    }
    out
}
