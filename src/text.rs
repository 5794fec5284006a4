//! Text Processing
//!
//! Prepares source input for the backend and turns generated text into
//! indented code blocks. The language table here is also the set of
//! languages the gateway accepts.

use std::collections::BTreeMap;

/// Spaces a tab expands to
const TAB_WIDTH: usize = 4;

/// Text collaborator used by the request pipeline
pub trait TextProcessor: Send + Sync {
    /// Line-comment token for `language`, if supported
    fn comment_token(&self, language: &str) -> Option<&str>;

    /// Whether `language` can be formatted
    fn is_supported(&self, language: &str) -> bool {
        self.comment_token(language).is_some()
    }

    /// Supported language tags, sorted
    fn supported_languages(&self) -> Vec<String>;

    /// Normalize raw input before it is sent to the backend
    fn process_input(&self, input: &str, language: &str) -> String;

    /// Strip the echoed prompt from `output`
    fn process_output(&self, input: &str, output: &str) -> String;

    /// Split `output` into blocks indented to `indent` spaces
    fn process_blocks(&self, output: &str, indent: usize, comment: &str) -> Vec<String>;

    /// Turn the backend's output into blocks ready for the client
    fn format_output(&self, input: &str, output: &str, language: &str) -> Vec<String> {
        let comment = self.comment_token(language).unwrap_or("#");
        let processed = self.process_output(&self.process_input(input, language), output);
        self.process_blocks(&processed, last_line_indent(input), comment)
    }
}

/// Default formatter: splits output into blank-line separated blocks and
/// aligns them with the last line of the input
#[derive(Debug, Clone)]
pub struct BlockFormatter {
    comments: BTreeMap<String, String>,
}

impl Default for BlockFormatter {
    fn default() -> Self {
        let comments = [
            ("c", "//"),
            ("cpp", "//"),
            ("csharp", "//"),
            ("go", "//"),
            ("java", "//"),
            ("javascript", "//"),
            ("kotlin", "//"),
            ("php", "//"),
            ("python", "#"),
            ("ruby", "#"),
            ("rust", "//"),
            ("shell", "#"),
            ("swift", "//"),
            ("typescript", "//"),
        ]
        .into_iter()
        .map(|(lang, token)| (lang.to_string(), token.to_string()))
        .collect();

        Self { comments }
    }
}

impl BlockFormatter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TextProcessor for BlockFormatter {
    fn comment_token(&self, language: &str) -> Option<&str> {
        self.comments.get(language).map(String::as_str)
    }

    fn supported_languages(&self) -> Vec<String> {
        self.comments.keys().cloned().collect()
    }

    fn process_input(&self, input: &str, _language: &str) -> String {
        normalize(input)
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn process_output(&self, input: &str, output: &str) -> String {
        let output = normalize(output);
        let input = normalize(input);
        match output.strip_prefix(input.as_str()) {
            Some(rest) => rest.to_string(),
            None => output,
        }
    }

    /// Trailing comment-only lines are dropped from each block.
    fn process_blocks(&self, output: &str, indent: usize, comment: &str) -> Vec<String> {
        let mut blocks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in output.lines() {
            if line.trim().is_empty() {
                if let Some(block) = finish_block(&current, indent, comment) {
                    blocks.push(block);
                }
                current.clear();
            } else {
                current.push(line);
            }
        }
        if let Some(block) = finish_block(&current, indent, comment) {
            blocks.push(block);
        }

        blocks
    }
}

/// Leading spaces on the last line of `input`
pub fn last_line_indent(input: &str) -> usize {
    normalize(input)
        .lines()
        .last()
        .map(leading_spaces)
        .unwrap_or(0)
}

fn leading_spaces(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count()
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\t', &" ".repeat(TAB_WIDTH))
}

fn finish_block(lines: &[&str], indent: usize, comment: &str) -> Option<String> {
    let mut end = lines.len();
    while end > 0 && lines[end - 1].trim_start().starts_with(comment) {
        end -= 1;
    }
    let lines = &lines[..end];
    if lines.is_empty() {
        return None;
    }

    let base = lines.iter().map(|l| leading_spaces(l)).min().unwrap_or(0);
    let pad = " ".repeat(indent);
    Some(
        lines
            .iter()
            .map(|line| format!("{}{}", pad, line[base..].trim_end()))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
