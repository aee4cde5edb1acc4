// Cricsheet match document models
//
// Only the fields the two output schemas need are modelled; everything else
// in the document (officials, registry, powerplays, ...) is ignored.

use serde::Deserialize;

/// One match document as published by Cricsheet
#[derive(Debug, Clone, Deserialize)]
pub struct RawMatchRecord {
    pub info: MatchInfo,
    #[serde(default)]
    pub innings: Vec<RawInnings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchInfo {
    #[serde(default)]
    pub teams: Vec<String>,

    /// Match dates as `YYYY-MM-DD`; the first one is the match date
    #[serde(default)]
    pub dates: Vec<String>,

    pub event: Option<EventInfo>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub toss: Option<TossInfo>,
    pub outcome: Option<OutcomeInfo>,

    #[serde(default)]
    pub player_of_match: Vec<String>,

    /// Competition sequence number. Usually an integer, occasionally a
    /// numeric string; anything else is rejected by the parser.
    pub match_type_number: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventInfo {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TossInfo {
    pub winner: Option<String>,
    pub decision: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeInfo {
    pub winner: Option<String>,
    /// "no result", "tie", "draw" when there is no winner
    pub result: Option<String>,
    pub by: Option<MarginInfo>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarginInfo {
    pub runs: Option<u32>,
    pub wickets: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawInnings {
    /// Batting team
    pub team: String,
    #[serde(default)]
    pub overs: Vec<RawOver>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOver {
    pub over: u32,
    #[serde(default)]
    pub deliveries: Vec<RawDelivery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDelivery {
    pub batter: String,
    pub bowler: String,
    pub non_striker: String,
    pub runs: RunsInfo,
    #[serde(default)]
    pub extras: ExtrasInfo,
    #[serde(default)]
    pub wickets: Vec<WicketInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunsInfo {
    #[serde(default)]
    pub batter: u32,
    #[serde(default)]
    pub extras: u32,
    #[serde(default)]
    pub total: u32,
}

/// Extras by category; absent categories are zero
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtrasInfo {
    #[serde(default)]
    pub wides: u32,
    #[serde(default)]
    pub legbyes: u32,
    #[serde(default)]
    pub byes: u32,
    #[serde(default)]
    pub noballs: u32,
    #[serde(default)]
    pub penalty: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WicketInfo {
    pub player_out: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub fielders: Vec<FielderInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FielderInfo {
    pub name: Option<String>,
}
