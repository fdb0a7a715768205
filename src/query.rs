//! Turning `key=value` tokens into a [`Selector`] tree.
//!
//! Tokens inside a group are combined with AND, groups with OR. On the
//! command line, groups are separated by a literal `or` or `OR` token.

use std::fmt;

use crate::error::SiftError;
use crate::selector::{AndSelector, OrSelector, RegexSelector, ScriptSelector, Selector};

/// The key that turns a token into a [`ScriptSelector`]. It also names the
/// shell that runs the script.
pub const SCRIPT_KEY: &str = "sh";

/// Tokens that split command-line queries into OR groups. Matched exactly.
pub const GROUP_SEPARATORS: [&str; 2] = ["or", "OR"];

/// One `key=value` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub key:   String,
    pub value: String,
}

impl Query {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key:   key.into(),
            value: value.into(),
        }
    }

    /// Split `s` on its first `=`. The value may be empty and may contain
    /// further `=` characters.
    pub fn parse(s: &str) -> Result<Self, SiftError> {
        match s.split_once('=') {
            Some((key, value)) => Ok(Self::new(key, value)),
            None => Err(SiftError::InvalidQuery(s.to_string())),
        }
    }

    /// Build the leaf selector for this condition. Regex patterns are compiled
    /// here, so a bad pattern fails before any pipeline work starts.
    pub fn to_selector(&self) -> Result<Box<dyn Selector>, SiftError> {
        if self.key == SCRIPT_KEY {
            return Ok(Box::new(ScriptSelector::new(&self.key, &self.value)));
        }
        let selector = RegexSelector::new(&self.key, &self.value).map_err(|source| {
            SiftError::InvalidPattern {
                query: self.to_string(),
                source,
            }
        })?;
        Ok(Box::new(selector))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Expand `$VAR` and `${VAR}` against the process environment. Unset
/// variables expand to the empty string.
pub fn expand_env(s: &str) -> String {
    shellexpand::env_with_context_no_errors(s, |var| {
        Some(std::env::var(var).unwrap_or_default())
    })
    .into_owned()
}

/// Split `tokens` into groups at every separator. Separators are dropped.
///
/// A leading or trailing separator produces an empty group at that end;
/// without separators the result is a single group holding every token.
pub fn split_groups<T: PartialEq + Clone>(tokens: &[T], separators: &[T]) -> Vec<Vec<T>> {
    let mut groups = Vec::new();
    let mut acc = Vec::new();
    for token in tokens {
        if separators.contains(token) {
            groups.push(std::mem::take(&mut acc));
        } else {
            acc.push(token.clone());
        }
    }
    groups.push(acc);
    groups
}

/// Parse one AND group. Each token is environment-expanded once, then parsed.
pub fn parse_group<S: AsRef<str>>(tokens: &[S]) -> Result<AndSelector, SiftError> {
    let children = tokens
        .iter()
        .map(|token| Query::parse(&expand_env(token.as_ref()))?.to_selector())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AndSelector::new(children))
}

/// Parse explicit OR groups of AND tokens.
pub fn parse_groups<S: AsRef<str>>(groups: &[Vec<S>]) -> Result<OrSelector, SiftError> {
    let children = groups
        .iter()
        .map(|group| parse_group(group).map(|s| Box::new(s) as Box<dyn Selector>))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OrSelector::new(children))
}

/// Parse command-line tokens, splitting groups at `or`/`OR`.
pub fn parse_command_line<S: AsRef<str>>(args: &[S]) -> Result<OrSelector, SiftError> {
    let tokens: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    parse_groups(&split_groups(&tokens, &GROUP_SEPARATORS[..]))
}
