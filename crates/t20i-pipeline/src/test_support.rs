//! Shared fixtures for unit tests

use serde_json::{json, Value};

/// A two-innings match, one over per innings, six balls per over, with a
/// single dismissal on the third ball of the second innings
pub fn match_document(date: &str, team_1: &str, team_2: &str, sequence: u32) -> Value {
    let over = |batter: &str, bowler: &str, wicket_on: Option<usize>| -> Vec<Value> {
        (0..6)
            .map(|i| {
                let mut ball = json!({
                    "batter": batter,
                    "bowler": bowler,
                    "non_striker": "Partner",
                    "runs": {"batter": 1, "extras": 0, "total": 1}
                });
                if wicket_on == Some(i) {
                    ball["runs"] = json!({"batter": 0, "extras": 0, "total": 0});
                    ball["wickets"] = json!([{"player_out": batter, "kind": "bowled"}]);
                }
                ball
            })
            .collect()
    };

    json!({
        "info": {
            "teams": [team_1, team_2],
            "dates": [date],
            "event": {"name": "Bilateral Series"},
            "venue": "Tribhuvan University International Cricket Ground",
            "city": "Kirtipur",
            "toss": {"winner": team_1, "decision": "bat"},
            "outcome": {"winner": team_1, "by": {"runs": 1}},
            "player_of_match": ["Opener"],
            "match_type_number": sequence
        },
        "innings": [
            {"team": team_1, "overs": [{"over": 0, "deliveries": over("Opener", "Seamer", None)}]},
            {
                "team": team_2,
                "overs": [{"over": 0, "deliveries": over("Chaser", "Spinner", Some(2))}]
            }
        ]
    })
}

pub fn match_bytes(date: &str, team_1: &str, team_2: &str, sequence: u32) -> Vec<u8> {
    serde_json::to_vec(&match_document(date, team_1, team_2, sequence)).unwrap_or_default()
}
