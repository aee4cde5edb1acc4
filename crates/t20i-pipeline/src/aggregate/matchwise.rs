use t20i_common::{MatchSummaryRecord, StatusField};

use super::Extraction;
use crate::cricsheet::ParsedMatch;

/// One row per match, kept in chronological order
///
/// `match_number` is reassigned over the whole dataset after every merge:
/// rows are ordered by (date, match ID) and numbered 1..N, so a late-arriving
/// older match shifts the numbers of everything after it.
pub struct MatchwiseExtraction;

impl Extraction for MatchwiseExtraction {
    type Record = MatchSummaryRecord;

    const STAGE: &'static str = "matchwise";
    const FIELD: StatusField = StatusField::Matchwise;

    fn rows(parsed: ParsedMatch) -> Vec<MatchSummaryRecord> {
        vec![parsed.summary]
    }

    fn finalize(rows: &mut Vec<MatchSummaryRecord>) {
        renumber(rows);
    }
}

/// Sort by chronology and assign dense match numbers starting at 1
pub fn renumber(rows: &mut [MatchSummaryRecord]) {
    rows.sort_by_key(MatchSummaryRecord::chronology);
    for (index, row) in rows.iter_mut().enumerate() {
        row.match_number = index as u32 + 1;
    }
}
