use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::foundation::error::{Text2WorldError, Text2WorldResult};

/// One entry of a batch input file.
///
/// Extra keys are accepted and ignored. A missing `prompt` is kept so the driver can report and
/// skip that entry at its original index.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PromptEntry {
    #[serde(default)]
    pub prompt: Option<String>,
}

impl PromptEntry {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

/// Read a JSONL batch file: one JSON object per non-blank line.
pub fn read_prompts_from_file(path: impl AsRef<Path>) -> Text2WorldResult<Vec<PromptEntry>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| {
        Text2WorldError::validation(format!("open batch input '{}': {e}", path.display()))
    })?;
    read_prompts(BufReader::new(f))
}

pub fn read_prompts(reader: impl BufRead) -> Text2WorldResult<Vec<PromptEntry>> {
    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            Text2WorldError::validation(format!("read batch input line {}: {e}", i + 1))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: PromptEntry = serde_json::from_str(&line).map_err(|e| {
            Text2WorldError::serde(format!("batch input line {}: {e}", i + 1))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_entries_and_keeps_missing_prompts() {
        let input = r#"{"prompt": "a lake"}

{"visual_input": "x.jpg"}
{"prompt": "a forest", "extra": 1}
"#;
        let entries = read_prompts(input.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                PromptEntry::new("a lake"),
                PromptEntry::default(),
                PromptEntry::new("a forest"),
            ]
        );
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let input = "{\"prompt\": \"ok\"}\nnot json\n";
        let err = read_prompts(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn missing_file_is_a_validation_error() {
        let err = read_prompts_from_file("target/does/not/exist.jsonl").unwrap_err();
        assert!(err.to_string().contains("validation error:"));
    }
}
