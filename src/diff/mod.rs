//! Line-granularity text diff between two versions of a script body.

use std::time::Duration;

use owo_colors::OwoColorize;
use similar::{Algorithm, ChangeTag, TextDiff};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRun {
    Equal(String),
    Insert(String),
    Delete(String),
}

impl DiffRun {
    pub fn text(&self) -> &str {
        match self {
            DiffRun::Equal(t) | DiffRun::Insert(t) | DiffRun::Delete(t) => t,
        }
    }
}

/// Ordered edit script turning an old text into a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    pub runs: Vec<DiffRun>,
}

/// Upper bound for the exact diff; past it the edit script may be longer
/// than the shortest one but still reproduces the new text.
const DIFF_TIMEOUT: Duration = Duration::from_secs(2);

impl DiffReport {
    /// Computes a line edit script from `old_text` to `new_text`.
    pub fn compute(old_text: &str, new_text: &str) -> Self {
        if old_text == new_text {
            let runs = if old_text.is_empty() { Vec::new() } else { vec![DiffRun::Equal(old_text.to_string())] };
            return Self { runs };
        }

        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .timeout(DIFF_TIMEOUT)
            .diff_lines(old_text, new_text);
        Self { runs: merge_runs(diff.iter_all_changes().map(|c| (c.tag(), c.value()))) }
    }

    /// True when every run is `Equal`.
    pub fn is_noop(&self) -> bool {
        self.runs.iter().all(|r| matches!(r, DiffRun::Equal(_)))
    }

    /// Renders the report, one prefixed line per source line.
    pub fn render(&self, styled: bool) -> String {
        let mut out = String::new();
        for run in &self.runs {
            for line in run.text().split_inclusive('\n') {
                let body = line.strip_suffix('\n').unwrap_or(line);
                let rendered = match (run, styled) {
                    (DiffRun::Equal(_), _) => format!("  {body}"),
                    (DiffRun::Insert(_), true) => format!("{}", format!("+ {body}").green()),
                    (DiffRun::Insert(_), false) => format!("+ {body}"),
                    (DiffRun::Delete(_), true) => format!("{}", format!("- {body}").red()),
                    (DiffRun::Delete(_), false) => format!("- {body}"),
                };
                out.push_str(&rendered);
                out.push('\n');
            }
        }
        out
    }
}

fn merge_runs<'t>(changes: impl Iterator<Item = (ChangeTag, &'t str)>) -> Vec<DiffRun> {
    let mut runs: Vec<DiffRun> = Vec::new();
    for (tag, line) in changes {
        match (runs.last_mut(), tag) {
            (Some(DiffRun::Equal(text)), ChangeTag::Equal)
            | (Some(DiffRun::Delete(text)), ChangeTag::Delete)
            | (Some(DiffRun::Insert(text)), ChangeTag::Insert) => text.push_str(line),
            (_, ChangeTag::Equal) => runs.push(DiffRun::Equal(line.to_string())),
            (_, ChangeTag::Delete) => runs.push(DiffRun::Delete(line.to_string())),
            (_, ChangeTag::Insert) => runs.push(DiffRun::Insert(line.to_string())),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(old_text: &str, report: &DiffReport) -> String {
        let mut out = String::new();
        let mut rest = old_text;
        for run in &report.runs {
            match run {
                DiffRun::Equal(t) => {
                    assert!(rest.starts_with(t.as_str()), "equal run {t:?} not at {rest:?}");
                    out.push_str(t);
                    rest = &rest[t.len()..];
                }
                DiffRun::Delete(t) => {
                    assert!(rest.starts_with(t.as_str()), "delete run {t:?} not at {rest:?}");
                    rest = &rest[t.len()..];
                }
                DiffRun::Insert(t) => out.push_str(t),
            }
        }
        assert!(rest.is_empty());
        out
    }

    #[test]
    fn single_changed_line_is_one_delete_insert_pair() {
        let report = DiffReport::compute("line1\nline2\n", "line1\nline3\n");
        assert!(!report.is_noop());
        assert_eq!(
            report.runs,
            vec![
                DiffRun::Equal("line1\n".into()),
                DiffRun::Delete("line2\n".into()),
                DiffRun::Insert("line3\n".into()),
            ]
        );
    }

    #[test]
    fn identical_texts_are_noop() {
        let report = DiffReport::compute("a\nb\n", "a\nb\n");
        assert!(report.is_noop());
        assert_eq!(report.runs, vec![DiffRun::Equal("a\nb\n".into())]);
        assert!(DiffReport::compute("", "").is_noop());
    }

    #[test]
    fn reports_reproduce_the_new_text() {
        let scenarios = [
            ("", "print('hi')"),
            ("print('hi')", ""),
            ("a\nb\nc\n", "a\nc\n"),
            ("a\nb\nc", "a\nB\nc\nd"),
            ("switch('s1', on)\nsleep(1)\n", "sleep(1)\nswitch('s1', off)\n"),
            ("no newline", "no newline\n"),
        ];
        for (old_text, new_text) in scenarios {
            let report = DiffReport::compute(old_text, new_text);
            assert_eq!(apply(old_text, &report), new_text, "old={old_text:?} new={new_text:?}");
            assert!(!report.is_noop());
        }
    }

    #[test]
    fn appended_lines_are_a_single_insert() {
        let report = DiffReport::compute("a\n", "a\nb\nc\n");
        assert_eq!(report.runs, vec![DiffRun::Equal("a\n".into()), DiffRun::Insert("b\nc\n".into())]);
    }

    #[test]
    fn full_rewrite_of_large_script() {
        let old_text: String = (0..4000).map(|i| format!("old_{i}\n")).collect();
        let new_text: String = (0..4000).map(|i| format!("new_{i}\n")).collect();

        let report = DiffReport::compute(&old_text, &new_text);
        assert_eq!(apply(&old_text, &report), new_text);
        assert!(report.runs.iter().all(|r| !matches!(r, DiffRun::Equal(_))));
        let deleted: usize = report
            .runs
            .iter()
            .filter(|r| matches!(r, DiffRun::Delete(_)))
            .map(|r| r.text().lines().count())
            .sum();
        assert_eq!(deleted, 4000);
    }

    #[test]
    fn plain_rendering_prefixes_lines() {
        let report = DiffReport::compute("line1\nline2\n", "line1\nline3\n");
        assert_eq!(report.render(false), "  line1\n- line2\n+ line3\n");
    }
}
