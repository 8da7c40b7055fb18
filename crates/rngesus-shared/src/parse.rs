//! Parsers for the comma-delimited answers the model is asked to give.
//!
//! Neither parser fails: anything that cannot be interpreted is dropped, and a
//! field the model has not produced yet simply parses to an empty value.

use std::collections::BTreeMap;

/// Split a comma-delimited answer into its items.
///
/// Each item is trimmed and loses one trailing period. Order and duplicates
/// are kept, and so are empty items in the middle of the list (`"a,,b"` has
/// three items). Blank input yields no items at all rather than one empty
/// item.
pub fn parse_list(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    text.split(',')
        .map(|item| {
            let item = item.trim();
            item.strip_suffix('.').unwrap_or(item).to_string()
        })
        .collect()
}

/// Parse `"Name: 12, Other: 3"` into a score map.
///
/// Items that are not exactly `name:digits` are discarded. When a name
/// repeats, the last score wins.
pub fn parse_attribute_scores(text: &str) -> BTreeMap<String, i64> {
    let mut scores = BTreeMap::new();

    for item in parse_list(text) {
        let parts: Vec<&str> = item.split(':').map(str::trim).collect();
        let [name, score] = parts.as_slice() else {
            continue;
        };
        if name.is_empty() || score.is_empty() || !score.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        if let Ok(score) = score.parse::<i64>() {
            scores.insert((*name).to_string(), score);
        }
    }

    scores
}

/// Render a list the way the model is asked to write one.
pub fn join_list(items: &[String]) -> String {
    items.join(", ")
}

/// Render scores in the `Name: 12, Other: 3` answer format.
pub fn join_attribute_scores(scores: &BTreeMap<String, i64>) -> String {
    scores
        .iter()
        .map(|(name, score)| format!("{name}: {score}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_trims_and_strips_periods() {
        assert_eq!(
            parse_list("Sword. , Potion ,Shield."),
            vec!["Sword", "Potion", "Shield"]
        );
    }

    #[test]
    fn list_strips_only_one_period() {
        assert_eq!(parse_list("Etc.., Dr."), vec!["Etc.", "Dr"]);
    }

    #[test]
    fn list_keeps_duplicates_and_inner_gaps() {
        assert_eq!(parse_list("Elf, Elf,, Orc"), vec!["Elf", "Elf", "", "Orc"]);
    }

    #[test]
    fn blank_list_is_empty() {
        assert!(parse_list("").is_empty());
        assert!(parse_list("   ").is_empty());
    }

    #[test]
    fn scores_drop_malformed_entries() {
        let scores = parse_attribute_scores("Power: 12, Influence: 8, BadEntry");
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["Power"], 12);
        assert_eq!(scores["Influence"], 8);
    }

    #[test]
    fn scores_reject_non_integers_and_extra_colons() {
        let scores = parse_attribute_scores("Luck: -3, Grit: 4.5, A: B: 3, Wit: 7., : 9");
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["Wit"], 7);
    }

    #[test]
    fn scores_last_duplicate_wins_and_trailing_comma_is_ignored() {
        let scores = parse_attribute_scores("Influence: 18, Power: 12, Influence: 3,");
        assert_eq!(scores["Influence"], 3);
        assert_eq!(scores["Power"], 12);
    }

    #[test]
    fn joined_scores_parse_back() {
        let scores = parse_attribute_scores("Power: 12, Influence: 8");
        assert_eq!(parse_attribute_scores(&join_attribute_scores(&scores)), scores);
    }
}
