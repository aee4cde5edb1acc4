//! Tabular record types shared by every pipeline stage
//!
//! Two fixed output schemas are produced from one match document:
//!
//! - [`DeliveryRecord`]: one row per ball bowled (20 columns)
//! - [`MatchSummaryRecord`]: one row per match
//!
//! Field order in each struct is the column order of the persisted CSV.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Match identifier, taken from the raw file's stem (`1234.json` -> 1234)
pub type MatchId = u64;

// ============================================================================
// Dataset Record Trait
// ============================================================================

/// A row type stored in a keyed, sorted flat dataset
pub trait DatasetRecord: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync {
    /// Natural key; unique across the whole dataset
    type Key: Ord + Clone + std::fmt::Debug + Send + Sync;

    /// Dataset name used in logs and error messages
    const DATASET: &'static str;

    /// Header row, in struct field order
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> Self::Key;

    fn match_id(&self) -> MatchId;
}

// ============================================================================
// Delivery Records
// ============================================================================

pub const DELIVERY_COLUMNS: &[&str] = &[
    "match_id",
    "innings_number",
    "batting_team",
    "bowling_team",
    "over_number",
    "ball_number",
    "batter",
    "bowler",
    "non_striker",
    "wide_runs",
    "leg_bye_runs",
    "bye_runs",
    "no_ball_runs",
    "penalty_runs",
    "batsman_runs",
    "extra_runs",
    "total_runs",
    "player_dismissed",
    "dismissal_type",
    "fielder_name",
];

/// One ball bowled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub match_id: MatchId,
    /// 1-based
    pub innings_number: u32,
    pub batting_team: String,
    pub bowling_team: String,
    pub over_number: u32,
    /// 1-based position within the over, illegal deliveries included
    pub ball_number: u32,
    pub batter: String,
    pub bowler: String,
    pub non_striker: String,
    pub wide_runs: u32,
    pub leg_bye_runs: u32,
    pub bye_runs: u32,
    pub no_ball_runs: u32,
    pub penalty_runs: u32,
    pub batsman_runs: u32,
    pub extra_runs: u32,
    pub total_runs: u32,
    pub player_dismissed: Option<String>,
    pub dismissal_type: Option<String>,
    pub fielder_name: Option<String>,
}

/// Composite delivery key: (match ID, innings, over, ball)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryKey {
    pub match_id: MatchId,
    pub innings_number: u32,
    pub over_number: u32,
    pub ball_number: u32,
}

impl std::fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.match_id, self.innings_number, self.over_number, self.ball_number
        )
    }
}

impl DeliveryRecord {
    pub fn is_wicket(&self) -> bool {
        self.player_dismissed.is_some()
    }
}

impl DatasetRecord for DeliveryRecord {
    type Key = DeliveryKey;

    const DATASET: &'static str = "deliverywise";
    const COLUMNS: &'static [&'static str] = DELIVERY_COLUMNS;

    fn key(&self) -> DeliveryKey {
        DeliveryKey {
            match_id: self.match_id,
            innings_number: self.innings_number,
            over_number: self.over_number,
            ball_number: self.ball_number,
        }
    }

    fn match_id(&self) -> MatchId {
        self.match_id
    }
}

// ============================================================================
// Match Summary Records
// ============================================================================

pub const MATCH_COLUMNS: &[&str] = &[
    "match_number",
    "match_id",
    "date",
    "event_name",
    "ground_name",
    "ground_city",
    "team_1",
    "team_2",
    "toss_winner",
    "toss_decision",
    "team_1_total_runs",
    "team_2_total_runs",
    "winner",
    "margin_runs",
    "margin_wickets",
    "winning_method",
    "player_of_the_match",
];

/// One row per match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummaryRecord {
    /// Sequential match index. Dense and date-ordered once the dataset has
    /// been renumbered.
    pub match_number: u32,
    pub match_id: MatchId,
    pub date: NaiveDate,
    pub event_name: Option<String>,
    pub ground_name: Option<String>,
    pub ground_city: Option<String>,
    pub team_1: String,
    pub team_2: String,
    pub toss_winner: Option<String>,
    pub toss_decision: Option<String>,
    pub team_1_total_runs: u32,
    pub team_2_total_runs: u32,
    /// Winning team, or the result text ("no result", "tie") when there is none
    pub winner: Option<String>,
    pub margin_runs: Option<u32>,
    pub margin_wickets: Option<u32>,
    pub winning_method: Option<String>,
    pub player_of_the_match: Option<String>,
}

impl MatchSummaryRecord {
    /// Chronological sort key: date first, match ID breaks ties
    pub fn chronology(&self) -> (NaiveDate, MatchId) {
        (self.date, self.match_id)
    }
}

impl DatasetRecord for MatchSummaryRecord {
    type Key = MatchId;

    const DATASET: &'static str = "matchwise";
    const COLUMNS: &'static [&'static str] = MATCH_COLUMNS;

    fn key(&self) -> MatchId {
        self.match_id
    }

    fn match_id(&self) -> MatchId {
        self.match_id
    }
}

// ============================================================================
// Processing Status
// ============================================================================

/// Which aggregator's completion flag a status update touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusField {
    Deliverywise,
    Matchwise,
}

impl StatusField {
    /// Column name in the status table
    pub fn column(self) -> &'static str {
        match self {
            StatusField::Deliverywise => "deliverywise_data_extraction_status",
            StatusField::Matchwise => "matchwise_data_extraction_status",
        }
    }
}

impl std::fmt::Display for StatusField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusField::Deliverywise => write!(f, "deliverywise"),
            StatusField::Matchwise => write!(f, "matchwise"),
        }
    }
}

/// Per-input extraction progress, keyed by raw file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub file_name: String,
    pub match_id: MatchId,
    pub delivery_done: bool,
    pub match_done: bool,
}

impl ProcessingStatus {
    pub fn new(file_name: impl Into<String>, match_id: MatchId) -> Self {
        Self {
            file_name: file_name.into(),
            match_id,
            delivery_done: false,
            match_done: false,
        }
    }

    pub fn get(&self, field: StatusField) -> bool {
        match field {
            StatusField::Deliverywise => self.delivery_done,
            StatusField::Matchwise => self.match_done,
        }
    }

    pub fn set(&mut self, field: StatusField, value: bool) {
        match field {
            StatusField::Deliverywise => self.delivery_done = value,
            StatusField::Matchwise => self.match_done = value,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.delivery_done && self.match_done
    }
}

/// Raw file name for a match ID
pub fn file_name_for(match_id: MatchId) -> String {
    format!("{}.json", match_id)
}

/// Parse the match ID from a storage key or file name (`a/b/1234.json` -> 1234)
pub fn match_id_from_key(key: &str) -> Option<MatchId> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let stem = file_name.strip_suffix(".json").unwrap_or(file_name);
    stem.parse().ok()
}
