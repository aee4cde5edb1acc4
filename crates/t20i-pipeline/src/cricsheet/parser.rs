//! Record parser
//!
//! Turns one match document into exactly one [`MatchSummaryRecord`] and the
//! ordered list of [`DeliveryRecord`]s it contains. Pure: no I/O, and either
//! both outputs are produced or the whole document is rejected.

use chrono::NaiveDate;
use serde_json::Value;
use t20i_common::{DeliveryRecord, MatchId, MatchSummaryRecord, PipelineError, Result};

use super::models::{RawDelivery, RawMatchRecord};

/// Output of parsing one match document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMatch {
    pub summary: MatchSummaryRecord,
    /// In document order: innings, then over, then ball
    pub deliveries: Vec<DeliveryRecord>,
}

/// Parse raw document bytes
///
/// `input` names the document in error messages (usually its file name).
pub fn parse_match(bytes: &[u8], match_id: MatchId, input: &str) -> Result<ParsedMatch> {
    let raw: RawMatchRecord = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::malformed(input, format!("invalid match document: {}", e)))?;
    parse_document(&raw, match_id, input)
}

/// Parse an already-deserialized document
pub fn parse_document(raw: &RawMatchRecord, match_id: MatchId, input: &str) -> Result<ParsedMatch> {
    let (team_1, team_2) = roster(raw, input)?;
    let match_number = competition_sequence(raw.info.match_type_number.as_ref(), input)?;
    let date = match_date(&raw.info.dates, input)?;
    let deliveries = flatten_deliveries(raw, match_id, (team_1, team_2), input)?;

    let runs_for = |team: &str| -> u32 {
        deliveries
            .iter()
            .filter(|d| d.batting_team == team)
            .map(|d| d.total_runs)
            .sum()
    };

    let info = &raw.info;
    let outcome = info.outcome.as_ref();
    let margin = outcome.and_then(|o| o.by.as_ref());
    let (margin_runs, margin_wickets) = match margin {
        Some(by) if by.runs.is_some() && by.wickets.is_some() => {
            return Err(PipelineError::malformed(
                input,
                "outcome margin has both runs and wickets",
            ));
        },
        Some(by) => (by.runs, by.wickets),
        None => (None, None),
    };

    let summary = MatchSummaryRecord {
        match_number,
        match_id,
        date,
        event_name: info.event.as_ref().and_then(|e| e.name.clone()),
        ground_name: info.venue.clone(),
        ground_city: info.city.clone(),
        team_1: team_1.to_string(),
        team_2: team_2.to_string(),
        toss_winner: info.toss.as_ref().and_then(|t| t.winner.clone()),
        toss_decision: info.toss.as_ref().and_then(|t| t.decision.clone()),
        team_1_total_runs: runs_for(team_1),
        team_2_total_runs: runs_for(team_2),
        winner: outcome.and_then(|o| o.winner.clone().or_else(|| o.result.clone())),
        margin_runs,
        margin_wickets,
        winning_method: outcome.and_then(|o| o.method.clone()),
        player_of_the_match: info.player_of_match.first().cloned(),
    };

    Ok(ParsedMatch {
        summary,
        deliveries,
    })
}

fn roster<'a>(raw: &'a RawMatchRecord, input: &str) -> Result<(&'a str, &'a str)> {
    match raw.info.teams.as_slice() {
        [a, b] if a != b => Ok((a.as_str(), b.as_str())),
        [a, b] => Err(PipelineError::malformed(
            input,
            format!("both teams are named '{}' ('{}')", a, b),
        )),
        teams => Err(PipelineError::malformed(
            input,
            format!("expected exactly 2 teams, found {}", teams.len()),
        )),
    }
}

/// Competition sequence number: an integer, or a string holding one
fn competition_sequence(value: Option<&Value>, input: &str) -> Result<u32> {
    let parsed = match value {
        None | Some(Value::Null) => {
            return Err(PipelineError::malformed(input, "match_type_number is missing"));
        },
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| {
        let shown = value.map(Value::to_string).unwrap_or_default();
        PipelineError::malformed(input, format!("match_type_number is not numeric: {}", shown))
    })
}

fn match_date(dates: &[String], input: &str) -> Result<NaiveDate> {
    let first = dates
        .first()
        .ok_or_else(|| PipelineError::malformed(input, "info.dates is empty"))?;
    NaiveDate::parse_from_str(first, "%Y-%m-%d").map_err(|e| {
        PipelineError::malformed(input, format!("invalid match date '{}': {}", first, e))
    })
}

fn flatten_deliveries(
    raw: &RawMatchRecord,
    match_id: MatchId,
    teams: (&str, &str),
    input: &str,
) -> Result<Vec<DeliveryRecord>> {
    let mut rows = Vec::new();

    for (innings_idx, innings) in raw.innings.iter().enumerate() {
        let batting = innings.team.as_str();
        let bowling = if batting == teams.0 {
            teams.1
        } else if batting == teams.1 {
            teams.0
        } else {
            return Err(PipelineError::malformed(
                input,
                format!(
                    "innings {} batting team '{}' is not in the roster",
                    innings_idx + 1,
                    batting
                ),
            ));
        };

        for over in &innings.overs {
            for (ball_idx, delivery) in over.deliveries.iter().enumerate() {
                rows.push(delivery_row(
                    match_id,
                    innings_idx as u32 + 1,
                    over.over,
                    ball_idx as u32 + 1,
                    (batting, bowling),
                    delivery,
                ));
            }
        }
    }

    Ok(rows)
}

fn delivery_row(
    match_id: MatchId,
    innings_number: u32,
    over_number: u32,
    ball_number: u32,
    (batting, bowling): (&str, &str),
    delivery: &RawDelivery,
) -> DeliveryRecord {
    // Only the first wicket is kept; a second dismissal on the same ball
    // (rare run-out pairs) is dropped.
    let wicket = delivery.wickets.first();
    let extras = &delivery.extras;

    DeliveryRecord {
        match_id,
        innings_number,
        batting_team: batting.to_string(),
        bowling_team: bowling.to_string(),
        over_number,
        ball_number,
        batter: delivery.batter.clone(),
        bowler: delivery.bowler.clone(),
        non_striker: delivery.non_striker.clone(),
        wide_runs: extras.wides,
        leg_bye_runs: extras.legbyes,
        bye_runs: extras.byes,
        no_ball_runs: extras.noballs,
        penalty_runs: extras.penalty,
        batsman_runs: delivery.runs.batter,
        extra_runs: delivery.runs.extras,
        total_runs: delivery.runs.total,
        player_dismissed: wicket.and_then(|w| w.player_out.clone()),
        dismissal_type: wicket.and_then(|w| w.kind.clone()),
        fielder_name: wicket
            .and_then(|w| w.fielders.first())
            .and_then(|f| f.name.clone()),
    }
}
