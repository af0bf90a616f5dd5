//! Scenario/batch file loader: `algo\nprog [prio]\n...`.
//!
//! The reference `ReadInputFile` builds each process name into a
//! fixed-size buffer and terminates it by comparing with `==` where an
//! assignment was intended, so names are not reliably NUL-terminated.
//! Building an owned `String` per field from `split_whitespace` has no
//! buffer to terminate, so there is nothing to reproduce.

use crate::error::ScenarioError;

#[derive(Debug, Clone)]
pub struct ScenarioEntry {
    pub path: String,
    pub priority: i64,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub policy_number: u8,
    pub entries: Vec<ScenarioEntry>,
}

const DEFAULT_PRIORITY: i64 = 100;

pub fn parse_scenario(contents: &str) -> Result<Scenario, ScenarioError> {
    let mut lines = contents.lines().map(str::trim).enumerate();

    let (_, first) = lines
        .find(|(_, l)| !l.is_empty())
        .ok_or(ScenarioError::Empty)?;
    let policy_number: u8 = first.parse().map_err(|_| ScenarioError::Malformed {
        line: 1,
        reason: format!("expected a single scheduling-algorithm digit, got {first:?}"),
    })?;
    if !(1..=4).contains(&policy_number) {
        return Err(ScenarioError::UnknownAlgorithm(policy_number));
    }

    let mut entries = Vec::new();
    for (idx, line) in lines {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let path = fields
            .next()
            .ok_or_else(|| ScenarioError::Malformed {
                line: idx + 1,
                reason: "missing executable path".to_string(),
            })?
            .to_string();
        let priority = match fields.next() {
            Some(p) => p.parse::<i64>().map_err(|_| ScenarioError::Malformed {
                line: idx + 1,
                reason: format!("invalid priority {p:?}"),
            })?,
            None => DEFAULT_PRIORITY,
        };
        entries.push(ScenarioEntry { path, priority });
    }

    if entries.is_empty() {
        return Err(ScenarioError::Empty);
    }

    crate::debug!(
        crate::logging::DebugMask::BATCH,
        "parsed scenario: algorithm {policy_number}, {} entries",
        entries.len()
    );
    Ok(Scenario {
        policy_number,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_algorithm_and_priority_defaulting() {
        let scenario = parse_scenario("2\np1\np2 50\n").unwrap();
        assert_eq!(scenario.policy_number, 2);
        assert_eq!(scenario.entries[0].priority, DEFAULT_PRIORITY);
        assert_eq!(scenario.entries[1].priority, 50);
    }

    #[test]
    fn rejects_unknown_algorithm_number() {
        let err = parse_scenario("9\np1\n").unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownAlgorithm(9)));
    }

    #[test]
    fn rejects_empty_file() {
        assert!(matches!(parse_scenario("").unwrap_err(), ScenarioError::Empty));
    }

    #[test]
    fn tolerates_blank_trailing_lines() {
        let scenario = parse_scenario("1\np1\n\n\n").unwrap();
        assert_eq!(scenario.entries.len(), 1);
    }
}
