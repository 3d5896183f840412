use std::fmt;

pub mod dashboard;
pub mod device_info;
pub mod monitor;
pub mod server_list;

/// A titled block of text, the terminal stand-in for a dashboard card.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub title: String,
    pub headline: String,
    pub lines: Vec<String>,
}

impl Card {
    pub fn new(title: impl Into<String>, headline: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            headline: headline.into(),
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[ {} ]", self.title)?;
        writeln!(f, "  {}", self.headline)?;
        for line in &self.lines {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

/// Key/value section with aligned labels.
pub(crate) fn section(title: &str, rows: &[(&str, String)]) -> String {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = format!("== {title} ==\n");
    for (label, value) in rows {
        out.push_str(&format!("  {label:<width$}  {value}\n"));
    }
    out
}

/// What a view shows when loading its data failed.
pub fn error_text(err: &impl fmt::Display) -> String {
    format!("Error: {err}")
}
