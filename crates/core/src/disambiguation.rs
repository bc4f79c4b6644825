use crate::models::RetrievalResult;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    Auto,
    Interactive,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SelectionMode::Auto),
            "interactive" => Ok(SelectionMode::Interactive),
            other => Err(format!("unknown selection mode `{other}`")),
        }
    }
}

/// What the outer shell captured from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionInput {
    Line(String),
    /// EOF, interrupt or any other cancellation.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Auto,
    /// Zero-based position in the candidate list.
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSelection {
    pub input: String,
    pub candidates: usize,
}

impl fmt::Display for InvalidSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid option `{}`: enter a number from 1 to {} or `auto`",
            self.input, self.candidates
        )
    }
}

impl std::error::Error for InvalidSelection {}

/// Accepts a 1-based position within `candidates` or the token `auto`.
pub fn parse_selection(input: &str, candidates: usize) -> Result<Selection, InvalidSelection> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("auto") {
        return Ok(Selection::Auto);
    }

    match trimmed.parse::<usize>() {
        Ok(position) if (1..=candidates).contains(&position) => Ok(Selection::Index(position - 1)),
        _ => Err(InvalidSelection {
            input: trimmed.to_string(),
            candidates,
        }),
    }
}

/// The interaction shell that shows candidates and returns the user's reply.
pub trait SelectionChannel {
    fn request(&mut self, candidates: &[RetrievalResult]) -> SelectionInput;

    fn reject(&mut self, error: &InvalidSelection);
}

/// Picks exactly one result. Invalid input is re-requested; a closed channel
/// falls back to the best-scored result.
///
/// # Panics
///
/// When `results` is empty. Callers check for an empty retrieval first.
pub fn choose<'r, C>(
    results: &'r [RetrievalResult],
    mode: SelectionMode,
    channel: &mut C,
) -> &'r RetrievalResult
where
    C: SelectionChannel + ?Sized,
{
    assert!(!results.is_empty(), "choose requires at least one retrieval result");

    if mode == SelectionMode::Auto || results.len() == 1 {
        return &results[0];
    }

    loop {
        match channel.request(results) {
            SelectionInput::Closed => {
                info!("selection cancelled, using the best match");
                return &results[0];
            }
            SelectionInput::Line(line) => match parse_selection(&line, results.len()) {
                Ok(Selection::Auto) => {
                    debug!("automatic selection requested");
                    return &results[0];
                }
                Ok(Selection::Index(position)) => return &results[position],
                Err(error) => channel.reject(&error),
            },
        }
    }
}

/// A channel that never has input; `choose` falls back to the best match.
pub struct ClosedChannel;

impl SelectionChannel for ClosedChannel {
    fn request(&mut self, _candidates: &[RetrievalResult]) -> SelectionInput {
        SelectionInput::Closed
    }

    fn reject(&mut self, _error: &InvalidSelection) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, FileType};
    use std::collections::VecDeque;

    struct ScriptedChannel {
        replies: VecDeque<SelectionInput>,
        requests: usize,
        rejections: Vec<String>,
    }

    impl ScriptedChannel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|reply| SelectionInput::Line(reply.to_string()))
                    .collect(),
                requests: 0,
                rejections: Vec::new(),
            }
        }
    }

    impl SelectionChannel for ScriptedChannel {
        fn request(&mut self, _candidates: &[RetrievalResult]) -> SelectionInput {
            self.requests += 1;
            self.replies.pop_front().unwrap_or(SelectionInput::Closed)
        }

        fn reject(&mut self, error: &InvalidSelection) {
            self.rejections.push(error.input.clone());
        }
    }

    fn results(count: usize) -> Vec<RetrievalResult> {
        (0..count)
            .map(|rank| RetrievalResult {
                chunk: Chunk::new(
                    format!("doc{rank}.pdf"),
                    0,
                    format!("passage {rank}"),
                    FileType::Pdf,
                    1,
                ),
                score: 1.0 - rank as f32 * 0.1,
                rank,
            })
            .collect()
    }

    #[test]
    fn parse_accepts_positions_and_auto() {
        assert_eq!(parse_selection(" 2 ", 3), Ok(Selection::Index(1)));
        assert_eq!(parse_selection("AUTO", 3), Ok(Selection::Auto));
        assert!(parse_selection("0", 3).is_err());
        assert!(parse_selection("4", 3).is_err());
        assert!(parse_selection("-1", 3).is_err());
        assert!(parse_selection("two", 3).is_err());
        assert!(parse_selection("", 3).is_err());
    }

    #[test]
    fn auto_mode_returns_first_without_asking() {
        let candidates = results(3);
        let mut channel = ScriptedChannel::new(&["3"]);
        let chosen = choose(&candidates, SelectionMode::Auto, &mut channel);
        assert_eq!(chosen, &candidates[0]);
        assert_eq!(channel.requests, 0);
    }

    #[test]
    fn interactive_mode_honours_the_choice() {
        let candidates = results(3);
        let mut channel = ScriptedChannel::new(&["3"]);
        let chosen = choose(&candidates, SelectionMode::Interactive, &mut channel);
        assert_eq!(chosen, &candidates[2]);
    }

    #[test]
    fn invalid_input_is_asked_again() {
        let candidates = results(3);
        let mut channel = ScriptedChannel::new(&["9", "abc", "2"]);
        let chosen = choose(&candidates, SelectionMode::Interactive, &mut channel);
        assert_eq!(chosen, &candidates[1]);
        assert_eq!(channel.requests, 3);
        assert_eq!(channel.rejections, vec!["9", "abc"]);
    }

    #[test]
    fn auto_token_picks_the_best_match() {
        let candidates = results(2);
        let mut channel = ScriptedChannel::new(&["auto"]);
        assert_eq!(
            choose(&candidates, SelectionMode::Interactive, &mut channel),
            &candidates[0]
        );
    }

    #[test]
    fn closed_channel_falls_back_to_best_match() {
        let candidates = results(4);
        let mut channel = ScriptedChannel::new(&["oops"]);
        let chosen = choose(&candidates, SelectionMode::Interactive, &mut channel);
        assert_eq!(chosen, &candidates[0]);
        assert_eq!(channel.rejections.len(), 1);

        assert_eq!(
            choose(&candidates, SelectionMode::Interactive, &mut ClosedChannel),
            &candidates[0]
        );
    }

    #[test]
    fn single_candidate_needs_no_prompt() {
        let candidates = results(1);
        let mut channel = ScriptedChannel::new(&[]);
        choose(&candidates, SelectionMode::Interactive, &mut channel);
        assert_eq!(channel.requests, 0);
    }

    #[test]
    #[should_panic(expected = "at least one retrieval result")]
    fn empty_results_violate_the_precondition() {
        choose(&[], SelectionMode::Auto, &mut ClosedChannel);
    }

    #[test]
    fn mode_parses_from_text() {
        assert_eq!("Interactive".parse::<SelectionMode>(), Ok(SelectionMode::Interactive));
        assert_eq!("auto".parse::<SelectionMode>(), Ok(SelectionMode::Auto));
        assert!("random".parse::<SelectionMode>().is_err());
    }
}
