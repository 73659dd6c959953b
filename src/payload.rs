use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("payload is empty")]
    Empty,
    #[error("line {0} is not a key=value assignment: {1:?}")]
    BadLine(usize, String),
}

/// Line-oriented parser for the flat `key=value` payload format.
///
/// Every line must match `key=value`, where the key is one or more word
/// characters and the value runs to the end of the line (it may be empty
/// and may contain further `=` signs). One bad line fails the whole
/// payload.
pub struct PayloadParser {
    line: Regex,
}

impl Default for PayloadParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadParser {
    pub fn new() -> Self {
        PayloadParser {
            line: Regex::new(r"^(\w+)=(.*)$").unwrap(),
        }
    }

    pub fn parse(&self, text: &str) -> Result<HashMap<String, String>, ParseFailure> {
        let mut tokens = HashMap::new();
        for (idx, line) in text.lines().enumerate() {
            let caps = self
                .line
                .captures(line)
                .ok_or_else(|| ParseFailure::BadLine(idx + 1, line.to_string()))?;
            // later assignments overwrite earlier ones
            tokens.insert(caps[1].to_string(), caps[2].to_string());
        }
        if tokens.is_empty() {
            return Err(ParseFailure::Empty);
        }
        Ok(tokens)
    }
}
