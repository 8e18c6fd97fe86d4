//! Printers: diagnostics with source context, dimmed script output and the project table.

use owo_colors::OwoColorize;
use thiserror::Error;
use unicode_width::UnicodeWidthStr;

use crate::project::ProjectDescriptor;
use crate::remote::SourceError;

/// Width of the `"{:>3} | "` line-number gutter.
pub const GUTTER_WIDTH: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentError {
    #[error("error location {line} is outside of the source ({available} lines)")]
    MalformedLocation { line: usize, available: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorPresenter {
    pub styled: bool,
}

impl ErrorPresenter {
    pub fn new(styled: bool) -> Self {
        Self { styled }
    }

    /// Renders `err` with up to one line of context on each side and a caret
    /// under the offending column.
    pub fn render(&self, err: &SourceError, source: &str) -> Result<String, PresentError> {
        let lines: Vec<&str> = source.lines().collect();
        let line = err.location.line;
        if line == 0 || line > lines.len() {
            return Err(PresentError::MalformedLocation { line, available: lines.len() });
        }

        let mut out = self.header(err);
        out.push('\n');
        if line > 1 {
            out.push_str(&self.source_line(line - 1, lines[line - 2]));
        }
        out.push_str(&self.source_line(line, lines[line - 1]));
        let pad = " ".repeat(err.location.column + GUTTER_WIDTH);
        if self.styled {
            out.push_str(&format!("{pad}{}\n", "^".red().bold()));
        } else {
            out.push_str(&format!("{pad}^\n"));
        }
        if line < lines.len() {
            out.push_str(&self.source_line(line + 1, lines[line]));
        }
        out.push('\n');
        out.push_str(&self.message(err));
        out.push('\n');
        Ok(out)
    }

    /// Header and message only, for errors whose location cannot be shown.
    pub fn render_without_context(&self, err: &SourceError) -> String {
        format!("{}\n{}\n", self.header(err), self.message(err))
    }

    fn header(&self, err: &SourceError) -> String {
        let loc = &err.location;
        let position = format!("at {}:{}:{}", loc.filename, loc.line, loc.column);
        if self.styled {
            format!("{} {}", err.error_type.cyan().bold(), position.bold())
        } else {
            format!("{} {}", err.error_type, position)
        }
    }

    fn message(&self, err: &SourceError) -> String {
        if self.styled {
            format!("{}", err.message.red().bold())
        } else {
            err.message.clone()
        }
    }

    fn source_line(&self, number: usize, text: &str) -> String {
        let gutter = format!("{number:>3} | ");
        if self.styled {
            format!("{}{}\n", gutter.bright_black(), text)
        } else {
            format!("{gutter}{text}\n")
        }
    }
}

pub struct TextPrinter {
    pub styled: bool,
}

impl TextPrinter {
    /// Script output is dimmed so it stands apart from client messages.
    pub fn paint_output(&self, text: &str) -> String {
        if self.styled {
            format!("{}", text.bright_black())
        } else {
            text.to_string()
        }
    }

    pub fn paint_success(&self, text: &str) -> String {
        if self.styled {
            format!("{}", text.green())
        } else {
            text.to_string()
        }
    }

    pub fn paint_failure(&self, text: &str) -> String {
        if self.styled {
            format!("{}", text.red())
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, text: &str) {
        println!("{}", self.paint_success(text));
    }

    pub fn failure(&self, text: &str) {
        println!("{}", self.paint_failure(text));
    }
}

/// Renders the `ls` table: id, name, icon and the two feature flags.
pub fn project_table(descriptors: &[ProjectDescriptor], styled: bool) -> String {
    const HEADERS: [&str; 5] = ["ID", "Name", "MDIcon", "QuickActions", "Scheduler"];
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    let rows: Vec<[String; 5]> = descriptors
        .iter()
        .map(|d| {
            [
                d.id.clone(),
                d.name.clone(),
                d.icon.clone(),
                yes_no(d.quick_actions_enabled).to_string(),
                yes_no(d.scheduler_enabled).to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(UnicodeWidthStr::width);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.width());
        }
    }

    let pad = |cell: &str, width: usize| format!("{cell}{}", " ".repeat(width - cell.width()));
    let mut out = String::new();

    let header: Vec<String> = HEADERS
        .iter()
        .zip(widths)
        .map(|(h, w)| if styled { format!("{}", pad(h, w).green().underline()) } else { pad(h, w) })
        .collect();
    out.push_str(header.join("  ").trim_end());
    out.push('\n');

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(i, (cell, w))| {
                if styled && i == 0 {
                    format!("{}", pad(cell, w).yellow())
                } else {
                    pad(cell, w)
                }
            })
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}
