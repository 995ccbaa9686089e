//! Extraction of score, reasoning and recognized answer from a model reply.
//!
//! Parsing never fails. Anything that could not be extracted cleanly is
//! reported as a [`ParseWarning`] next to the best-effort result.

use crate::config::ParsingSettings;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Fields pulled out of one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    /// `None` when no usable score was found
    pub score: Option<f64>,
    pub reasoning: String,
    pub student_answer: Option<String>,
    pub warnings: Vec<ParseWarning>,
}

/// Non-fatal problems found while parsing a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseWarning {
    MissingScore,
    /// A score marker was present but never followed by a plain number
    MalformedScore { text: String },
    ScoreOutOfRange { value: f64, min: f64, max: f64 },
    MissingReasoning,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::MissingScore => write!(f, "no score found in reply"),
            ParseWarning::MalformedScore { text } => {
                write!(f, "score is not a plain number: {:?}", text)
            }
            ParseWarning::ScoreOutOfRange { value, min, max } => {
                write!(f, "score {} outside [{}, {}]", value, min, max)
            }
            ParseWarning::MissingReasoning => {
                write!(f, "no reasoning section, using the full reply")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    Score,
    Reasoning,
    StudentAnswer,
}

/// Parser built from the `parsing` configuration section.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    score: Regex,
    reasoning: Regex,
    student_answer: Regex,
    min: f64,
    max: f64,
}

impl ResponseParser {
    pub fn new(settings: &ParsingSettings) -> Result<Self> {
        Ok(Self {
            score: compile("score_marker", &settings.score_marker)?,
            reasoning: compile("reasoning_marker", &settings.reasoning_marker)?,
            student_answer: compile("student_answer_marker", &settings.student_answer_marker)?,
            min: settings.score_min,
            max: settings.score_max,
        })
    }

    pub fn parse(&self, reply: &str) -> Parsed {
        let markers = self.markers(reply);
        let mut warnings = Vec::new();

        let score = self.score(reply, &markers, &mut warnings);

        let reasoning = match section(reply, &markers, Marker::Reasoning) {
            Some(text) => text,
            None => {
                warnings.push(ParseWarning::MissingReasoning);
                reply.trim().to_string()
            }
        };

        Parsed {
            score,
            reasoning,
            student_answer: section(reply, &markers, Marker::StudentAnswer),
            warnings,
        }
    }

    // Every marker occurrence as (start, end, kind), in text order.
    fn markers(&self, reply: &str) -> Vec<(usize, usize, Marker)> {
        let mut found: Vec<_> = [
            (&self.score, Marker::Score),
            (&self.reasoning, Marker::Reasoning),
            (&self.student_answer, Marker::StudentAnswer),
        ]
        .into_iter()
        .flat_map(|(re, kind)| {
            re.find_iter(reply)
                .filter(|m| !m.as_str().is_empty())
                .map(move |m| (m.start(), m.end(), kind))
        })
        .collect();
        found.sort_by_key(|&(start, end, _)| (start, end));
        found
    }

    fn score(
        &self,
        reply: &str,
        markers: &[(usize, usize, Marker)],
        warnings: &mut Vec<ParseWarning>,
    ) -> Option<f64> {
        let mut malformed = None;

        for &(_, end, _) in markers.iter().filter(|(_, _, kind)| *kind == Marker::Score) {
            let rest = &reply[end..];
            match leading_number(rest) {
                Some(value) if (self.min..=self.max).contains(&value) => return Some(value),
                Some(value) => {
                    warnings.push(ParseWarning::ScoreOutOfRange {
                        value,
                        min: self.min,
                        max: self.max,
                    });
                    return None;
                }
                None => {
                    if malformed.is_none() {
                        let line = rest.lines().next().unwrap_or("").trim();
                        malformed = Some(line.to_string());
                    }
                }
            }
        }

        warnings.push(match malformed {
            Some(text) => ParseWarning::MalformedScore { text },
            None => ParseWarning::MissingScore,
        });
        None
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::Config(format!("Invalid parsing.{} pattern: {}", field, e)))
}

// A plain number at the start of `text`, after horizontal whitespace and
// emphasis. Fractions like "8/10" do not count.
fn leading_number(text: &str) -> Option<f64> {
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
    let number = NUMBER
        .get_or_init(|| Regex::new(r"^[ \t*_]*([+-]?\d+(?:\.\d+)?)[ \t]*(/)?").ok())
        .as_ref()?;

    let caps = number.captures(text)?;
    if caps.get(2).is_some() {
        return None;
    }
    caps.get(1)?.as_str().parse().ok()
}

// Text after the first `kind` marker up to the next marker of another kind.
// A repeated marker of the same kind stays part of the section.
fn section(reply: &str, markers: &[(usize, usize, Marker)], kind: Marker) -> Option<String> {
    let (_, end, _) = *markers.iter().find(|(_, _, k)| *k == kind)?;
    let stop = markers
        .iter()
        .filter(|(start, _, k)| *k != kind && *start >= end)
        .map(|&(start, _, _)| start)
        .next()
        .unwrap_or(reply.len());

    let text = reply[end..stop].trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ResponseParser {
        ResponseParser::new(&ParsingSettings::default()).unwrap()
    }

    #[test]
    fn score_and_reasoning() {
        let parsed = parser().parse("Score: 85\nReasoning: Good work");
        assert_eq!(parsed.score, Some(85.0));
        assert_eq!(parsed.reasoning, "Good work");
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn no_markers_falls_back_to_full_reply() {
        let parsed = parser().parse("no markers here");
        assert_eq!(parsed.score, None);
        assert_eq!(parsed.reasoning, "no markers here");
        assert!(parsed.warnings.contains(&ParseWarning::MissingScore));
    }

    #[test]
    fn out_of_range_score_is_dropped() {
        let parsed = parser().parse("Score: 150\nReasoning: generous");
        assert_eq!(parsed.score, None);
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning::ScoreOutOfRange {
                value: 150.0,
                min: 0.0,
                max: 100.0
            }]
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        assert_eq!(parser().parse("Score: 0").score, Some(0.0));
        assert_eq!(parser().parse("Score: 100").score, Some(100.0));
    }

    #[test]
    fn decimal_and_markdown_emphasis() {
        let parsed = parser().parse("**Score:** 92.5\n**Reasoning:** Mostly right.");
        assert_eq!(parsed.score, Some(92.5));
        assert_eq!(parsed.reasoning, "Mostly right.");
    }

    #[test]
    fn case_insensitive_marker() {
        assert_eq!(parser().parse("SCORE: 70").score, Some(70.0));
        assert_eq!(parser().parse("final score: 64").score, Some(64.0));
        assert_eq!(parser().parse("得分：75").score, Some(75.0));
    }

    #[test]
    fn fraction_is_skipped_for_later_score() {
        let parsed = parser().parse("Score: 8/10\nScore: 80\nReasoning: ok");
        assert_eq!(parsed.score, Some(80.0));
    }

    #[test]
    fn only_fraction_is_malformed() {
        let parsed = parser().parse("Score: 8 / 10");
        assert_eq!(parsed.score, None);
        assert_eq!(
            parsed.warnings[0],
            ParseWarning::MalformedScore {
                text: "8 / 10".to_string()
            }
        );
    }

    #[test]
    fn first_well_formed_score_wins() {
        let parsed = parser().parse("Score: 60\nScore: 90");
        assert_eq!(parsed.score, Some(60.0));
    }

    #[test]
    fn chinese_markers() {
        let reply = "识别的学生答案：x = 4\n分数：88\n评分理由：步骤完整";
        let parsed = parser().parse(reply);
        assert_eq!(parsed.score, Some(88.0));
        assert_eq!(parsed.reasoning, "步骤完整");
        assert_eq!(parsed.student_answer.as_deref(), Some("x = 4"));
    }

    #[test]
    fn sections_stop_at_next_marker() {
        let reply =
            "Student Answer: 2x = 8, x = 4\nReasoning: correct steps\nboth lines\nScore: 95";
        let parsed = parser().parse(reply);
        assert_eq!(parsed.student_answer.as_deref(), Some("2x = 8, x = 4"));
        assert_eq!(parsed.reasoning, "correct steps\nboth lines");
        assert_eq!(parsed.score, Some(95.0));
    }

    #[test]
    fn reasoning_keeps_lines_starting_with_the_marker_word() {
        let reply = "Score: 70\nReasoning: The final value is right.\n\
                     Reasoning steps for part b are missing, so 30 points were deducted.";
        let parsed = parser().parse(reply);
        assert_eq!(
            parsed.reasoning,
            "The final value is right.\n\
             Reasoning steps for part b are missing, so 30 points were deducted."
        );
    }

    #[test]
    fn repeated_reasoning_marker_stays_in_section() {
        let parsed = parser().parse("Reasoning: part a ok\nReasoning: part b wrong\nScore: 50");
        assert_eq!(parsed.reasoning, "part a ok\nReasoning: part b wrong");
        assert_eq!(parsed.score, Some(50.0));
    }

    #[test]
    fn reasoning_colon_is_optional() {
        let parsed = parser().parse("Score: 50\nReasoning\nHalf the steps are missing.");
        assert_eq!(parsed.reasoning, "Half the steps are missing.");
    }

    #[test]
    fn score_mentioned_mid_sentence_is_ignored() {
        let parsed = parser().parse("I would give a score: 40 but no.\nReasoning: unclear");
        assert_eq!(parsed.score, None);
        assert!(parsed.warnings.contains(&ParseWarning::MissingScore));
    }

    #[test]
    fn custom_range() {
        let settings = ParsingSettings {
            score_min: 0.0,
            score_max: 10.0,
            ..ParsingSettings::default()
        };
        let parser = ResponseParser::new(&settings).unwrap();
        assert_eq!(parser.parse("Score: 9").score, Some(9.0));
        assert_eq!(parser.parse("Score: 11").score, None);
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let settings = ParsingSettings {
            score_marker: "(unclosed".to_string(),
            ..ParsingSettings::default()
        };
        assert!(matches!(ResponseParser::new(&settings), Err(Error::Config(_))));
    }

    #[test]
    fn parsing_is_deterministic() {
        let reply = "Student Answer: 42\nScore: 77\nReasoning: fine";
        let p = parser();
        assert_eq!(p.parse(reply), p.parse(reply));
    }
}
