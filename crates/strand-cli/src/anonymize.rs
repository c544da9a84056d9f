//! UUID anonymization for JSONL logs
//!
//! Every UUID found in a JSON string value is replaced with
//! `<prefix>-0000-0000-0000-<sequence>`. The prefix is random per file and
//! the same UUID always maps to the same replacement within a file, so logs
//! stay internally consistent after anonymization.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};
use serde_json::Value;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
});

/// Consistent UUID replacement for one file
#[derive(Debug)]
pub struct Anonymizer {
    prefix: String,
    mapping: BTreeMap<String, String>,
}

impl Anonymizer {
    /// Create an anonymizer with a random 8-hex-digit prefix
    pub fn new() -> Result<Self> {
        let mut bytes = [0u8; 4];
        getrandom::fill(&mut bytes).map_err(|e| anyhow!("Failed to generate prefix: {}", e))?;
        let prefix = bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>();
        Ok(Self::with_prefix(prefix))
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            mapping: BTreeMap::new(),
        }
    }

    /// Original (lowercased) UUID to replacement
    pub fn mapping(&self) -> &BTreeMap<String, String> {
        &self.mapping
    }

    fn replacement(&mut self, uuid: &str) -> String {
        let key = uuid.to_lowercase();
        let next = self.mapping.len() + 1;
        let prefix = &self.prefix;
        self.mapping
            .entry(key)
            .or_insert_with(|| format!("{}-0000-0000-0000-{:012}", prefix, next))
            .clone()
    }

    /// Replace every UUID in a string
    pub fn anonymize_str(&mut self, text: &str) -> String {
        UUID_RE
            .replace_all(text, |caps: &Captures| self.replacement(&caps[0]))
            .into_owned()
    }

    /// Replace UUIDs in every string inside a JSON value. Object keys are left alone.
    pub fn anonymize_value(&mut self, value: &mut Value) {
        match value {
            Value::String(s) => {
                if UUID_RE.is_match(s) {
                    *s = self.anonymize_str(s);
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.anonymize_value(v)),
            Value::Object(map) => map.values_mut().for_each(|v| self.anonymize_value(v)),
            _ => {}
        }
    }

    /// Anonymize one line of a JSONL file. Lines that are not JSON pass through.
    pub fn anonymize_line(&mut self, line_num: usize, line: &str) -> Result<String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(String::new());
        }
        match serde_json::from_str::<Value>(line) {
            Ok(mut value) => {
                self.anonymize_value(&mut value);
                Ok(serde_json::to_string(&value)?)
            }
            Err(e) => {
                tracing::warn!("Line {} is not valid JSON, keeping it as is: {}", line_num, e);
                Ok(line.to_string())
            }
        }
    }

    /// Anonymize a whole JSONL document
    pub fn anonymize_document(&mut self, content: &str) -> Result<String> {
        let mut out = String::with_capacity(content.len());
        for (i, line) in content.lines().enumerate() {
            out.push_str(&self.anonymize_line(i + 1, line)?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Where the anonymized output goes
pub fn output_path(input: &Path, output: Option<&Path>, in_place: bool) -> PathBuf {
    if in_place {
        return input.with_extension("jsonl.tmp");
    }
    match output {
        Some(path) => path.to_path_buf(),
        None => input.with_extension("anonymized.jsonl"),
    }
}

/// Anonymize `input`, writing to `output`, or replacing `input` when `in_place`.
/// Returns the path written and the mapping used.
pub fn anonymize_file(
    input: &Path,
    output: Option<&Path>,
    in_place: bool,
) -> Result<(PathBuf, BTreeMap<String, String>)> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let mut anonymizer = Anonymizer::new()?;
    let anonymized = anonymizer.anonymize_document(&content)?;

    let target = output_path(input, output, in_place);
    fs::write(&target, anonymized)
        .with_context(|| format!("Failed to write {}", target.display()))?;

    if in_place {
        fs::rename(&target, input).with_context(|| {
            format!("Failed to replace {} with {}", input.display(), target.display())
        })?;
        return Ok((input.to_path_buf(), anonymizer.mapping));
    }
    Ok((target, anonymizer.mapping))
}
