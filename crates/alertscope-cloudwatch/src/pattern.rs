use regex::Regex;

use crate::error::SourceError;

/// Compiled log filter pattern
///
/// - `%regex%` matches the regex anywhere in the message
/// - `"a phrase"` matches as a substring
/// - otherwise every whitespace-separated term must occur
#[derive(Clone, Debug)]
pub enum FilterPattern {
    /// Matches everything
    Any,
    Regex(Regex),
    Phrase(String),
    Terms(Vec<String>),
}

impl FilterPattern {
    pub fn parse(pattern: &str) -> Result<Self, SourceError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Ok(Self::Any);
        }

        if trimmed.len() >= 2 && trimmed.starts_with('%') && trimmed.ends_with('%') {
            let inner = &trimmed[1..trimmed.len() - 1];
            let regex = Regex::new(inner).map_err(|source| SourceError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
            return Ok(Self::Regex(regex));
        }

        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            return Ok(Self::Phrase(trimmed[1..trimmed.len() - 1].to_string()));
        }

        Ok(Self::Terms(
            trimmed.split_whitespace().map(str::to_string).collect(),
        ))
    }

    pub fn matches(&self, message: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Regex(re) => re.is_match(message),
            Self::Phrase(phrase) => message.contains(phrase.as_str()),
            Self::Terms(terms) => terms.iter().all(|t| message.contains(t.as_str())),
        }
    }
}
