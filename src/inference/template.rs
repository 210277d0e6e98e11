//! Prompt templates
//!
//! A template is literal text with exactly one `{name}` substitution point.
//! `{{` and `}}` stand for literal braces, so prompts may still contain JSON
//! or code snippets.

use crate::inference::error::TemplateError;

/// Placeholder name used when the configuration does not name one.
pub const DEFAULT_PLACEHOLDER: &str = "text";

/// A parsed prompt template with a single user-input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    placeholder: String,
    prefix: String,
    suffix: String,
}

enum Segment {
    Literal(String),
    Placeholder(String),
}

impl PromptTemplate {
    /// Parse `source`, requiring `{placeholder}` to appear exactly once.
    pub fn new(source: impl Into<String>, placeholder: &str) -> Result<Self, TemplateError> {
        let source = source.into();
        if !is_identifier(placeholder) {
            return Err(TemplateError::InvalidName(placeholder.to_string()));
        }

        let segments = parse_segments(&source)?;

        let mut count = 0;
        for segment in &segments {
            if let Segment::Placeholder(name) = segment {
                if name != placeholder {
                    return Err(TemplateError::UnknownPlaceholder(name.clone()));
                }
                count += 1;
            }
        }

        match count {
            0 => return Err(TemplateError::MissingPlaceholder(placeholder.to_string())),
            1 => {}
            _ => {
                return Err(TemplateError::DuplicatePlaceholder {
                    name: placeholder.to_string(),
                    count,
                })
            }
        }

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut seen = false;
        for segment in segments {
            match segment {
                Segment::Literal(text) if seen => suffix.push_str(&text),
                Segment::Literal(text) => prefix.push_str(&text),
                Segment::Placeholder(_) => seen = true,
            }
        }

        Ok(Self {
            source,
            placeholder: placeholder.to_string(),
            prefix,
            suffix,
        })
    }

    /// Substitute `input` at the placeholder. The input is inserted verbatim.
    pub fn render(&self, input: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + input.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(input);
        out.push_str(&self.suffix);
        out
    }

    /// The template text as written, escapes included.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn parse_segments(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    literal.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace(i));
                }
                if !is_identifier(&name) {
                    return Err(TemplateError::InvalidName(name));
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name));
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    literal.push('}');
                } else {
                    return Err(TemplateError::UnbalancedBrace(i));
                }
            }
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}
