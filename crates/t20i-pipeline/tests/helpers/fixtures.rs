//! Match document and archive builders for integration tests

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};

/// Builder for a Cricsheet match document
///
/// Every innings has `overs` overs of six legal deliveries; each delivery
/// scores `runs_per_ball` to the batter. An optional dismissal is placed on
/// the first ball of the last over of the second innings.
#[derive(Debug, Clone)]
pub struct MatchFixture {
    date: String,
    team_1: String,
    team_2: String,
    sequence: u32,
    overs: u32,
    runs_per_ball: u32,
    with_wicket: bool,
    winner: Option<String>,
}

impl MatchFixture {
    pub fn new(
        date: impl Into<String>,
        team_1: impl Into<String>,
        team_2: impl Into<String>,
    ) -> Self {
        let team_1 = team_1.into();
        Self {
            date: date.into(),
            winner: Some(team_1.clone()),
            team_1,
            team_2: team_2.into(),
            sequence: 1,
            overs: 1,
            runs_per_ball: 1,
            with_wicket: false,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_overs(mut self, overs: u32) -> Self {
        self.overs = overs;
        self
    }

    pub fn with_runs_per_ball(mut self, runs: u32) -> Self {
        self.runs_per_ball = runs;
        self
    }

    pub fn with_wicket(mut self) -> Self {
        self.with_wicket = true;
        self
    }

    /// No winner; the outcome records a no result
    pub fn abandoned(mut self) -> Self {
        self.winner = None;
        self
    }

    /// Deliveries per innings
    pub fn balls_per_innings(&self) -> usize {
        (self.overs * 6) as usize
    }

    pub fn to_json(&self) -> Value {
        let innings = |team: &str, batter: &str, bowler: &str, wicket: bool| -> Value {
            let overs: Vec<Value> = (0..self.overs)
                .map(|over| {
                    let deliveries: Vec<Value> = (0..6)
                        .map(|ball| {
                            let mut delivery = json!({
                                "batter": batter,
                                "bowler": bowler,
                                "non_striker": format!("{} partner", batter),
                                "runs": {
                                    "batter": self.runs_per_ball,
                                    "extras": 0,
                                    "total": self.runs_per_ball
                                }
                            });
                            if wicket && over + 1 == self.overs && ball == 0 {
                                delivery["wickets"] = json!([{
                                    "player_out": batter,
                                    "kind": "caught",
                                    "fielders": [{"name": "Keeper"}]
                                }]);
                            }
                            delivery
                        })
                        .collect();
                    json!({"over": over, "deliveries": deliveries})
                })
                .collect();
            json!({"team": team, "overs": overs})
        };

        let outcome = match &self.winner {
            Some(winner) => json!({"winner": winner, "by": {"runs": 4}}),
            None => json!({"result": "no result"}),
        };

        json!({
            "meta": {"data_version": "1.1.0"},
            "info": {
                "teams": [self.team_1, self.team_2],
                "dates": [self.date],
                "event": {"name": "Tri-Nation Series"},
                "venue": "Wankhede Stadium",
                "city": "Mumbai",
                "toss": {"winner": self.team_2, "decision": "field"},
                "outcome": outcome,
                "player_of_match": ["Top Scorer"],
                "match_type_number": self.sequence
            },
            "innings": [
                innings(&self.team_1, "Top Scorer", "Quick", false),
                innings(&self.team_2, "Chaser", "Spinner", self.with_wicket)
            ]
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.to_json()).expect("fixture serializes")
    }
}

/// Archive entries keyed by file name, as the ingestion stage receives them
pub fn archive_entries(matches: &[(u64, &MatchFixture)]) -> BTreeMap<String, Vec<u8>> {
    matches
        .iter()
        .map(|(id, fixture)| (format!("{}.json", id), fixture.to_bytes()))
        .collect()
}

/// A zip archive in the upstream layout: match documents plus a README
pub fn zip_archive(entries: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        writer
            .start_file("README.txt", options)
            .expect("Failed to start README");
        writer
            .write_all(b"Men's T20I matches")
            .expect("Failed to write README");
        for (name, body) in entries {
            writer.start_file(name.as_str(), options).expect("Failed to start entry");
            writer.write_all(body).expect("Failed to write entry");
        }
        writer.finish().expect("Failed to finish archive");
    }
    buffer.into_inner()
}
