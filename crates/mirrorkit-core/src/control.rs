//! Parser for deb822 control paragraphs, the format of Release and index files.

use std::fmt;

/// One field-per-line paragraph. Field order is preserved and lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stanza {
    fields: Vec<(String, String)>,
}

/// Raw paragraph text together with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph<'a> {
    pub first_line: usize,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlError {
    pub line: usize,
    pub reason: String,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

impl std::error::Error for ControlError {}

/// Splits `text` on blank lines. Line numbers are 1-based.
pub fn split_paragraphs(text: &str) -> Vec<Paragraph<'_>> {
    let mut paragraphs = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut offset = 0;

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let blank = line.trim().is_empty();
        match (blank, start) {
            (false, None) => start = Some((idx + 1, offset)),
            (true, Some((first_line, begin))) => {
                paragraphs.push(Paragraph {
                    first_line,
                    text: &text[begin..offset],
                });
                start = None;
            }
            _ => {}
        }
        offset += line.len();
    }

    if let Some((first_line, begin)) = start {
        paragraphs.push(Paragraph {
            first_line,
            text: &text[begin..],
        });
    }

    paragraphs
}

impl Stanza {
    /// Parses one paragraph. `first_line` is used for error positions only.
    pub fn parse(text: &str, first_line: usize) -> Result<Self, ControlError> {
        let mut fields: Vec<(String, String)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = first_line + idx;
            if raw.starts_with('#') {
                continue;
            }

            if raw.starts_with(' ') || raw.starts_with('\t') {
                let Some((_, value)) = fields.last_mut() else {
                    return Err(ControlError {
                        line: line_no,
                        reason: "continuation line without a field".into(),
                    });
                };
                let cont = raw.trim();
                if !value.is_empty() {
                    value.push('\n');
                }
                // "." stands for an empty line inside a multi-line value
                if cont != "." {
                    value.push_str(cont);
                }
                continue;
            }

            let Some((name, value)) = raw.split_once(':') else {
                return Err(ControlError {
                    line: line_no,
                    reason: format!("expected `Field: value`, found `{}`", raw.trim_end()),
                });
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(ControlError {
                    line: line_no,
                    reason: format!("invalid field name `{name}`"),
                });
            }
            fields.push((name.to_string(), value.trim().to_string()));
        }

        Ok(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The value split into lines, for multi-line fields such as checksum lists.
    pub fn lines(&self, name: &str) -> impl Iterator<Item = &str> {
        self.get(name)
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Stanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            let mut lines = value.split('\n');
            write!(f, "{name}:")?;
            match lines.next() {
                Some(first) if !first.is_empty() => writeln!(f, " {first}")?,
                _ => writeln!(f)?,
            }
            for line in lines {
                if line.is_empty() {
                    writeln!(f, " .")?;
                } else {
                    writeln!(f, " {line}")?;
                }
            }
        }
        Ok(())
    }
}

/// Parses every paragraph in `text`, skipping ones made only of comments.
pub fn parse_stanzas(text: &str) -> Result<Vec<Stanza>, ControlError> {
    split_paragraphs(text)
        .into_iter()
        .map(|p| Stanza::parse(p.text, p.first_line))
        .filter(|s| !matches!(s, Ok(s) if s.is_empty()))
        .collect()
}
