//! Parsing for the scheduler's whitespace-aligned status/accounting output
//! (§4.4, Design Note "Poll-parsed accounting output"). Isolated here with a
//! fixture-driven test suite since the format is fragile; a regex picks the
//! state-mnemonic token out of a line whose column widths otherwise shift
//! between scheduler versions.

use gateway_core::StateTag;
use regex::Regex;
use std::sync::OnceLock;

fn dashes_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\s-]+$").expect("static pattern is valid"))
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\S+").expect("static pattern is valid"))
}

/// The outcome of attempting to parse one status-check response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedState {
    /// Token index 1 of the second-to-last line parsed as a known mnemonic.
    Known(StateTag),
    /// The mnemonic token wasn't recognized; callers log and retry.
    Unknown(String),
    /// Fewer than three output lines: the job isn't listed on the
    /// accounting view yet.
    TooFewLines,
    /// The accounting view returned a header/dashes separator with no data
    /// row yet.
    DashesLine,
}

/// Parses the second-to-last line of `output`, token index 1, as a state
/// mnemonic (§4.4).
pub fn parse_state_line(output: &str) -> ParsedState {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() < 3 {
        return ParsedState::TooFewLines;
    }

    let data_line = lines[lines.len() - 2];
    if dashes_line_pattern().is_match(data_line) {
        return ParsedState::DashesLine;
    }

    let tokens: Vec<&str> = token_pattern().find_iter(data_line).map(|m| m.as_str()).collect();
    match tokens.get(1) {
        Some(token) => match token.parse::<StateTag>() {
            Ok(tag) => ParsedState::Known(tag),
            Err(_) => ParsedState::Unknown((*token).to_string()),
        },
        None => ParsedState::TooFewLines,
    }
}

/// Parses the last whitespace-delimited token of the submission wrapper's
/// first output line as the positive-integer remote job id (§4.4, §6).
pub fn parse_submit_output(output: &str) -> Option<u64> {
    let first_line = output.lines().next()?;
    let last_token = token_pattern().find_iter(first_line).last()?.as_str();
    last_token.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::StateTag;

    #[test]
    fn parses_running_state_from_three_line_fixture() {
        let output = "JobID    State\n--------  -----\n12345     RUNNING   alloc\n";
        assert_eq!(parse_state_line(output), ParsedState::Known(StateTag::Running));
    }

    #[test]
    fn fewer_than_three_lines_is_transient() {
        let output = "JobID    State\n12345     RUNNING\n";
        assert_eq!(parse_state_line(output), ParsedState::TooFewLines);
    }

    #[test]
    fn dashes_only_line_is_transient() {
        let output = "JobID    State\n------------------\n";
        assert_eq!(parse_state_line(output), ParsedState::TooFewLines);

        let output = "JobID    State\n------------------\n                  \n";
        assert_eq!(parse_state_line(output), ParsedState::DashesLine);
    }

    #[test]
    fn unrecognized_mnemonic_is_reported_not_dropped() {
        let output = "JobID    State\n--------  -----\n12345     WEIRD_NEW_STATE   alloc\n";
        assert_eq!(
            parse_state_line(output),
            ParsedState::Unknown("WEIRD_NEW_STATE".to_string())
        );
    }

    #[test]
    fn submit_output_extracts_trailing_numeric_token() {
        assert_eq!(parse_submit_output("Submitted batch job 98765\n"), Some(98765));
    }

    #[test]
    fn submit_output_rejects_non_numeric_token() {
        assert_eq!(parse_submit_output("submission rejected: quota\n"), None);
    }
}
