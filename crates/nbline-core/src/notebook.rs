//! Typed notebook document model.
//!
//! Only the fields the renderer consumes are typed. Everything else a cell or
//! output carries is kept in an `extra` map so documents survive a
//! read/write cycle unchanged.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// MIME key of the plain-text representation in a rich output bundle.
pub const TEXT_PLAIN: &str = "text/plain";

/// Newest nbformat 4 minor version; used when a document omits it.
pub const DEFAULT_NBFORMAT_MINOR: u32 = 5;

/// Text stored either as one string or as fragments to be concatenated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineText {
    Text(String),
    Fragments(Vec<String>),
}

impl Default for MultilineText {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MultilineText {
    /// The full text, fragments concatenated with no separator.
    pub fn joined(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Fragments(parts) => Cow::Owned(parts.concat()),
        }
    }

    /// Interpret a raw JSON value (e.g. a MIME bundle entry) as text.
    ///
    /// Returns `None` for anything that is not a string or a list of strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

impl From<&str> for MultilineText {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for MultilineText {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Cell type as read from `cell_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
    /// Any kind this model does not know; rendered like markdown.
    Other(String),
}

impl CellKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Raw => "raw",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for CellKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "code" => Self::Code,
            "markdown" => Self::Markdown,
            "raw" => Self::Raw,
            _ => Self::Other(name),
        }
    }
}

impl Serialize for CellKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CellKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// A whole notebook document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_nbformat() -> u32 {
    crate::format::SUPPORTED_NBFORMAT
}

fn default_nbformat_minor() -> u32 {
    DEFAULT_NBFORMAT_MINOR
}

impl Notebook {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: default_nbformat(),
            nbformat_minor: default_nbformat_minor(),
            extra: Map::new(),
        }
    }

    /// Cell kinds outside code/markdown/raw, in sorted order.
    pub fn unknown_cell_kinds(&self) -> BTreeSet<&str> {
        self.cells
            .iter()
            .filter_map(|cell| match &cell.kind {
                CellKind::Other(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Output types that fell into [`Output::Other`], in sorted order.
    pub fn unknown_output_kinds(&self) -> BTreeSet<&str> {
        self.cells
            .iter()
            .flat_map(|cell| cell.outputs())
            .filter_map(|output| match output {
                Output::Other { output_type, .. } => Some(output_type.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// One notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(rename = "cell_type")]
    pub kind: CellKind,
    #[serde(default)]
    pub source: MultilineText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<Output>>,
    /// `id`, `metadata`, `execution_count`, `attachments` and anything else.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cell {
    pub fn new(kind: CellKind, source: impl Into<MultilineText>) -> Self {
        Self {
            kind,
            source: source.into(),
            outputs: None,
            extra: Map::new(),
        }
    }

    pub fn markdown(source: impl Into<MultilineText>) -> Self {
        Self::new(CellKind::Markdown, source)
    }

    pub fn code(source: impl Into<MultilineText>, outputs: Vec<Output>) -> Self {
        Self {
            outputs: Some(outputs),
            ..Self::new(CellKind::Code, source)
        }
    }

    /// Outputs in recorded order; empty when the cell has none.
    pub fn outputs(&self) -> &[Output] {
        self.outputs.as_deref().unwrap_or_default()
    }
}

/// Captured stdout/stderr text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub text: MultilineText,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `execute_result` or `display_data` payload: a MIME bundle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RichOutput {
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RichOutput {
    /// The `text/plain` entry, if present and textual.
    pub fn text_plain(&self) -> Option<MultilineText> {
        self.data.get(TEXT_PLAIN).and_then(MultilineText::from_value)
    }
}

/// A raised exception with its pre-formatted traceback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalue: Option<String>,
    #[serde(default)]
    pub traceback: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One recorded output of a code cell, discriminated by `output_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Stream(StreamOutput),
    ExecuteResult(RichOutput),
    DisplayData(RichOutput),
    Error(ErrorOutput),
    /// Unrecognized `output_type`; kept verbatim.
    Other {
        output_type: String,
        fields: Map<String, Value>,
    },
}

impl Output {
    pub fn output_type(&self) -> &str {
        match self {
            Self::Stream(_) => "stream",
            Self::ExecuteResult(_) => "execute_result",
            Self::DisplayData(_) => "display_data",
            Self::Error(_) => "error",
            Self::Other { output_type, .. } => output_type,
        }
    }

    pub fn stream(text: impl Into<MultilineText>) -> Self {
        Self::Stream(StreamOutput {
            name: Some("stdout".to_string()),
            text: text.into(),
            extra: Map::new(),
        })
    }
}

impl Serialize for Output {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            Self::Stream(stream) => serde_json::to_value(stream),
            Self::ExecuteResult(rich) | Self::DisplayData(rich) => serde_json::to_value(rich),
            Self::Error(error) => serde_json::to_value(error),
            Self::Other { fields, .. } => Ok(Value::Object(fields.clone())),
        }
        .map_err(<S::Error as ser::Error>::custom)?;

        let Value::Object(mut fields) = body else {
            return Err(ser::Error::custom("output body did not serialize to an object"));
        };
        fields.insert(
            "output_type".to_string(),
            Value::String(self.output_type().to_string()),
        );
        fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Output {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let output_type = match fields.remove("output_type") {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(de::Error::custom("output_type must be a string")),
            None => return Err(de::Error::missing_field("output_type")),
        };

        let output = match output_type.as_str() {
            "stream" => Self::Stream(from_fields::<_, D::Error>(fields)?),
            "execute_result" => Self::ExecuteResult(from_fields::<_, D::Error>(fields)?),
            "display_data" => Self::DisplayData(from_fields::<_, D::Error>(fields)?),
            "error" => Self::Error(from_fields::<_, D::Error>(fields)?),
            _ => Self::Other {
                output_type,
                fields,
            },
        };
        Ok(output)
    }
}

fn from_fields<T: DeserializeOwned, E: de::Error>(fields: Map<String, Value>) -> Result<T, E> {
    serde_json::from_value(Value::Object(fields)).map_err(E::custom)
}
