use regex::{Regex, RegexBuilder};

use crate::foundation::error::{Text2WorldError, Text2WorldResult};
use crate::guardrail::core::{ContentSafetyGuardrail, GuardrailInput, SafetyVerdict};

/// Case-insensitive whole-word blocklist for text prompts.
///
/// Each entry is matched as a literal word or phrase that cannot sit inside a longer word, so
/// `"gun"` blocks `"a Gun"` but not `"begun"`, and `"c++"` blocks `"I love c++"`. Runs of
/// whitespace inside a phrase match any whitespace.
pub struct Blocklist {
    terms: Vec<String>,
    pattern: Regex,
}

impl Blocklist {
    pub fn new<I, S>(terms: I) -> Text2WorldResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Err(Text2WorldError::validation(
                "blocklist must contain at least one non-empty term",
            ));
        }

        let alternation = terms
            .iter()
            .map(|t| term_pattern(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| Text2WorldError::validation(format!("invalid blocklist: {e}")))?;

        Ok(Self { terms, pattern })
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// First blocked term found in `text`, as it appears in the text.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.pattern.find(text).map(|m| m.as_str())
    }
}

/// Escaped regex for one term, anchored so the term cannot sit inside a longer word.
///
/// `\b` only holds next to a word character, so a side that starts or ends with punctuation
/// (`c++`, `@admin`) is anchored with `\B` instead: the neighbour must be a non-word character
/// or the text edge.
fn term_pattern(term: &str) -> String {
    let body = term
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let anchor = |c: Option<char>| match c {
        Some(c) if is_word_char(c) => r"\b",
        _ => r"\B",
    };
    format!(
        "(?:{}{body}{})",
        anchor(term.chars().next()),
        anchor(term.chars().last())
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl ContentSafetyGuardrail for Blocklist {
    fn is_safe(&self, input: GuardrailInput<'_>) -> Text2WorldResult<SafetyVerdict> {
        let GuardrailInput::Text(text) = input else {
            return Err(Text2WorldError::validation(format!(
                "blocklist guardrail only accepts text input, got {}",
                input.kind()
            )));
        };

        match self.find(text) {
            Some(term) => Ok(SafetyVerdict::blocked(format!(
                "prompt contains blocked term '{}'",
                term.to_lowercase()
            ))),
            None => Ok(SafetyVerdict::safe("no blocked terms found")),
        }
    }

    fn name(&self) -> &str {
        "blocklist"
    }
}
