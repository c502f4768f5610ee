use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::relocate::next_backup_path;
use crate::time_value::TimeValue;

const TWO_LINE_JOIN_LIMIT: usize = 30;
const THREE_LINE_JOIN_LIMIT: usize = 20;

/// How a subtitle file's cue timings are moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftSpec {
    pub offset: TimeValue,
    /// Cues ending after this point are dropped; `None` keeps everything.
    pub max: Option<TimeValue>,
    pub negative: bool,
}

impl ShiftSpec {
    /// A zero `max` means no cap.
    pub fn new(offset: TimeValue, max: TimeValue, negative: bool) -> Self {
        Self {
            offset,
            max: (max != TimeValue::ZERO).then_some(max),
            negative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    pub start: TimeValue,
    pub end: TimeValue,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftSummary {
    pub total: usize,
    pub kept: usize,
    pub backup: PathBuf,
}

/// Parse SubRip text into cues, silently skipping malformed blocks.
pub fn parse_cues(text: &str) -> Vec<Cue> {
    let cleaned = text.trim_start_matches('\u{feff}').replace('\r', "");
    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in cleaned.lines().map(str::trim).chain(std::iter::once("")) {
        if line.is_empty() {
            if !block.is_empty() {
                cues.extend(parse_block(&block));
                block.clear();
            }
        } else {
            block.push(line);
        }
    }
    cues
}

fn parse_block(block: &[&str]) -> Option<Cue> {
    let (number, rest) = block.split_first()?;
    if !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (timing, text) = rest.split_first()?;
    let (from, to) = timing.split_once("-->")?;
    Some(Cue {
        start: TimeValue::parse(from).ok()?,
        end: TimeValue::parse(to).ok()?,
        lines: text.iter().map(|l| l.to_string()).collect(),
    })
}

/// Apply `spec` to one cue. Returns `None` when the cue falls outside the
/// allowed window.
pub fn shift_cue(cue: &Cue, spec: &ShiftSpec) -> Option<Cue> {
    let end = cue.end.shifted(spec.offset, spec.negative);
    if end.is_negative() {
        return None;
    }
    if spec.max.is_some_and(|max| end > max) {
        return None;
    }
    let start = cue.start.shifted(spec.offset, spec.negative).at_least(TimeValue::ZERO);
    Some(Cue {
        start,
        end,
        lines: reflow(&cue.lines),
    })
}

/// Join short caption lines so they read better on screen.
pub fn reflow(lines: &[String]) -> Vec<String> {
    let short = |line: &String, limit: usize| line.chars().count() < limit;
    match lines {
        [a, b] if short(a, TWO_LINE_JOIN_LIMIT) && short(b, TWO_LINE_JOIN_LIMIT) => {
            vec![format!("{} {}", a, b)]
        }
        [a, b, c]
            if short(a, THREE_LINE_JOIN_LIMIT)
                && short(b, THREE_LINE_JOIN_LIMIT)
                && short(c, THREE_LINE_JOIN_LIMIT) =>
        {
            let joined = format!("{} {} {}", a, b, c);
            // Midpoint counted in characters, split at the next space
            let middle = joined.chars().count() / 2;
            let split = joined
                .char_indices()
                .skip(middle)
                .find(|&(_, c)| c == ' ')
                .map(|(at, _)| at);
            match split {
                Some(at) => {
                    let (first, second) = joined.split_at(at);
                    vec![first.to_string(), second.trim_start().to_string()]
                }
                None => lines.to_vec(),
            }
        }
        _ => lines.to_vec(),
    }
}

/// Shift every cue and render the surviving ones, numbered from 1.
pub fn shift_text(text: &str, spec: &ShiftSpec) -> (String, usize, usize) {
    let cues = parse_cues(text);
    let total = cues.len();
    let mut out = String::new();
    let mut kept = 0;

    for cue in cues.iter().filter_map(|c| shift_cue(c, spec)) {
        kept += 1;
        out.push_str(&format!(
            "{}\n{} --> {}\n",
            kept,
            cue.start.format(),
            cue.end.format()
        ));
        for line in &cue.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    (out, total, kept)
}

/// Rewrite a subtitle file in place after copying it to `<path>_BACKUP<n>`.
pub fn shift_file(path: &Path, spec: &ShiftSpec) -> Result<ShiftSummary> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let text = String::from_utf8_lossy(&bytes);

    let backup = next_backup_path(path);
    std::fs::copy(path, &backup)
        .with_context(|| format!("Failed to back up {:?} to {:?}", path, backup))?;

    let (shifted, total, kept) = shift_text(&text, spec);
    std::fs::write(path, shifted).with_context(|| format!("Failed to write {:?}", path))?;
    debug!("Rewrote {:?} with {} cues", path, kept);

    Ok(ShiftSummary {
        total,
        kept,
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str) -> TimeValue {
        TimeValue::parse(text).unwrap()
    }

    #[test]
    fn test_zero_max_means_uncapped() {
        assert_eq!(ShiftSpec::new(t("5"), TimeValue::ZERO, false).max, None);
        assert_eq!(ShiftSpec::new(t("5"), t("60"), false).max, Some(t("60")));
    }

    #[test]
    fn test_parse_skips_malformed_blocks() {
        let text = "\u{feff}1\r\n00:00:01,000 --> 00:00:02,000\r\nHello\r\n\r\n\
                    x\n00:00:03,000 --> 00:00:04,000\nbad number\n\n\
                    3\nno arrow here\ntext\n\n\
                    4\n00:00:05,000 --> 00:00:06,000\nlast without blank";
        let cues = parse_cues(text);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].lines, vec!["Hello"]);
        assert_eq!(cues[1].start, t("5"));
    }

    #[test]
    fn test_reflow_counts_characters_not_bytes() {
        let lines: Vec<String> = ["Så går vi hjem", "og får øl", "på åen"]
            .iter()
            .map(|l| l.to_string())
            .collect();
        assert_eq!(reflow(&lines), vec!["Så går vi hjem og", "får øl på åen"]);

        // 15 characters but 30 bytes still counts as short
        let wide = vec!["æ".repeat(15), "ø".to_string()];
        assert_eq!(reflow(&wide), vec![format!("{} ø", "æ".repeat(15))]);

        let (out, total, kept) = shift_text(
            "1\n00:00:01,000 --> 00:00:02,000\næææ\nx\ny\n",
            &ShiftSpec::new(TimeValue::ZERO, TimeValue::ZERO, false),
        );
        assert_eq!((total, kept), (1, 1));
        assert_eq!(out, "1\n00:00:01,000 --> 00:00:02,000\næææ\nx y\n\n");
    }

    #[test]
    fn test_reflow_rules() {
        let two = vec!["short one".to_string(), "short two".to_string()];
        assert_eq!(reflow(&two), vec!["short one short two"]);

        let long = vec!["a".repeat(30), "b".to_string()];
        assert_eq!(reflow(&long), long);

        let three = vec!["one two".to_string(), "three".to_string(), "four five".to_string()];
        assert_eq!(reflow(&three), vec!["one two three", "four five"]);

        let single = vec!["alone".to_string()];
        assert_eq!(reflow(&single), single);
    }

    #[test]
    fn test_shift_cue_window() {
        let cue = Cue {
            start: t("00:00:02"),
            end: t("00:00:10"),
            lines: vec!["x".to_string()],
        };

        let back = ShiftSpec::new(t("5"), TimeValue::ZERO, true);
        let shifted = shift_cue(&cue, &back).unwrap();
        assert_eq!(shifted.start, TimeValue::ZERO);
        assert_eq!(shifted.end, t("5"));

        let too_far = ShiftSpec::new(t("11"), TimeValue::ZERO, true);
        assert_eq!(shift_cue(&cue, &too_far), None);

        let capped = ShiftSpec::new(t("5"), t("12"), false);
        assert_eq!(shift_cue(&cue, &capped), None);
    }

    #[test]
    fn test_shift_text_renumbers() {
        let text = "7\n00:00:01,000 --> 00:00:02,000\nfirst\n\n\
                    8\n00:01:00,000 --> 00:01:02,500\nsecond\n";
        let spec = ShiftSpec::new(t("00:00:30"), TimeValue::ZERO, true);
        let (out, total, kept) = shift_text(text, &spec);
        assert_eq!((total, kept), (2, 1));
        assert_eq!(out, "1\n00:00:30,000 --> 00:00:32,500\nsecond\n\n");
    }
}
