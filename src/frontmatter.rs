//! Front matter detection and parsing.
//!
//! A page is a text file that opens with a fenced metadata block:
//!
//! ```text
//! ---                 +++
//! title: Hello        title = "Hello"
//! weight: 5           weight = 5
//! ---                 +++
//! body...             body...
//! ```
//!
//! Parsers are pluggable. The loader reads a short byte prefix of every file
//! and asks the [`FrontMatterRegistry`] whether any parser recognizes it;
//! parsers are tried in registration order and the first match wins.

use crate::value::{ScriptObject, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("front matter opened with `{0}` is never closed")]
    Unterminated(&'static str),
    #[error("invalid YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid TOML front matter: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0} front matter must be a mapping of keys to values")]
    NotATable(&'static str),
}

/// Parsed front matter block.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub values: ScriptObject,
    /// Byte offset in the source text where the body starts.
    pub body_start: usize,
}

pub trait FrontMatterParser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the file prefix (BOM already skipped) opens a block this
    /// parser understands.
    fn can_handle(&self, prefix: &[u8]) -> bool;

    fn parse(&self, text: &str) -> Result<FrontMatter, FrontMatterError>;
}

/// `---` fenced YAML.
#[derive(Debug, Default)]
pub struct YamlFrontMatter;

/// `+++` fenced TOML.
#[derive(Debug, Default)]
pub struct TomlFrontMatter;

const YAML_FENCE: &str = "---";
const TOML_FENCE: &str = "+++";

fn opens_with_fence(prefix: &[u8], fence: &str) -> bool {
    let Some(rest) = prefix.strip_prefix(fence.as_bytes()) else {
        return false;
    };
    rest.starts_with(b"\n") || rest.starts_with(b"\r\n")
}

/// Split `text` into the fenced block and the body offset.
///
/// The opening fence must be the first line; the block ends at the first
/// later line that equals the fence (trailing whitespace ignored).
fn split_fenced<'a>(text: &'a str, fence: &'static str) -> Result<(&'a str, usize), FrontMatterError> {
    let Some(rest) = text.strip_prefix(fence) else {
        return Err(FrontMatterError::Unterminated(fence));
    };
    let open_len = fence.len()
        + if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with('\n') {
            1
        } else {
            return Err(FrontMatterError::Unterminated(fence));
        };

    let mut pos = open_len;
    while pos <= text.len() {
        let (line_end, next) = match text[pos..].find('\n') {
            Some(offset) => (pos + offset, pos + offset + 1),
            None => (text.len(), text.len()),
        };
        if text[pos..line_end].trim_end() == fence {
            return Ok((&text[open_len..pos], next));
        }
        if next == text.len() {
            break;
        }
        pos = next;
    }
    Err(FrontMatterError::Unterminated(fence))
}

impl FrontMatterParser for YamlFrontMatter {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn can_handle(&self, prefix: &[u8]) -> bool {
        opens_with_fence(prefix, YAML_FENCE)
    }

    fn parse(&self, text: &str) -> Result<FrontMatter, FrontMatterError> {
        let (block, body_start) = split_fenced(text, YAML_FENCE)?;
        let parsed: serde_yaml::Value = serde_yaml::from_str(block)?;
        let values = match Value::from(parsed) {
            Value::Null => ScriptObject::new(),
            Value::Object(values) => values,
            _ => return Err(FrontMatterError::NotATable("YAML")),
        };
        Ok(FrontMatter { values, body_start })
    }
}

impl FrontMatterParser for TomlFrontMatter {
    fn name(&self) -> &'static str {
        "toml"
    }

    fn can_handle(&self, prefix: &[u8]) -> bool {
        opens_with_fence(prefix, TOML_FENCE)
    }

    fn parse(&self, text: &str) -> Result<FrontMatter, FrontMatterError> {
        let (block, body_start) = split_fenced(text, TOML_FENCE)?;
        let table: toml::Table = toml::from_str(block)?;
        let values = table
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect();
        Ok(FrontMatter { values, body_start })
    }
}

/// Ordered set of front matter parsers.
pub struct FrontMatterRegistry {
    parsers: Vec<Box<dyn FrontMatterParser>>,
}

impl Default for FrontMatterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(YamlFrontMatter);
        registry.register(TomlFrontMatter);
        registry
    }
}

impl FrontMatterRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    pub fn register(&mut self, parser: impl FrontMatterParser + 'static) {
        self.parsers.push(Box::new(parser));
    }

    /// First parser that recognizes `prefix`.
    pub fn find(&self, prefix: &[u8]) -> Option<&dyn FrontMatterParser> {
        self.parsers
            .iter()
            .find(|p| p.can_handle(prefix))
            .map(|p| &**p)
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for FrontMatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.parsers.iter().map(|p| p.name()).collect();
        f.debug_struct("FrontMatterRegistry")
            .field("parsers", &names)
            .finish()
    }
}
