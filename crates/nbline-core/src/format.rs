//! nbformat 4 reading and writing.
//!
//! On disk, multiline strings are stored as lists of lines and the JSON is
//! indented with sorted keys. In memory they are rejoined into single strings.
//! Documents in the older 2.x and 3.x layouts are upgraded to 4.x on load.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};

use nbline_config::WriteSettings;

use crate::notebook::{Cell, MultilineText, Notebook, Output};
use crate::upgrade;

/// The only nbformat major version this crate reads and writes.
pub const SUPPORTED_NBFORMAT: u32 = 4;

/// MIME types split into line lists on disk even though they are not `text/*`.
const NON_TEXT_SPLIT_MIMES: [&str; 2] = ["application/javascript", "image/svg+xml"];

/// Notebook metadata keys that only describe the loaded copy.
const TRANSIENT_METADATA: [&str; 3] = ["orig_nbformat", "orig_nbformat_minor", "signature"];

/// Cell metadata key that only describes the loaded copy.
const TRANSIENT_CELL_METADATA: &str = "trusted";

/// Document-level format failures that are not plain JSON errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    UnsupportedVersion { found: u32 },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found } => write!(
                f,
                "unsupported nbformat version {found} (expected {} to {SUPPORTED_NBFORMAT})",
                upgrade::OLDEST_UPGRADABLE
            ),
        }
    }
}

impl std::error::Error for FormatError {}

/// Parse a JSON document without rejoining multiline values.
///
/// 2.x and 3.x documents are upgraded to the 4.0 layout first.
pub fn from_json_str(input: &str) -> Result<Notebook> {
    let mut value: Value = serde_json::from_str(input).context("failed to parse notebook JSON")?;
    if let Value::Object(doc) = &mut value {
        let major = doc.get("nbformat").and_then(Value::as_u64);
        if let Some(major) = major.filter(|major| upgrade::is_upgradable(*major)) {
            upgrade::to_v4(doc, major);
            tracing::info!(from = major, "upgraded notebook to nbformat 4");
        }
    }

    let notebook: Notebook =
        serde_json::from_value(value).context("failed to parse notebook JSON")?;
    if notebook.nbformat != SUPPORTED_NBFORMAT {
        return Err(FormatError::UnsupportedVersion {
            found: notebook.nbformat,
        }
        .into());
    }
    flag_unknown_kinds(&notebook);
    Ok(notebook)
}

/// Parse an on-disk document and rejoin its multiline values.
pub fn read_str(input: &str) -> Result<Notebook> {
    let mut notebook = from_json_str(input)?;
    rejoin_lines(&mut notebook);
    Ok(notebook)
}

/// Read a notebook file from disk.
pub fn read_path(path: &Path) -> Result<Notebook> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read notebook at {}", path.display()))?;
    let notebook =
        read_str(&raw).with_context(|| format!("invalid notebook at {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        cells = notebook.cells.len(),
        nbformat_minor = notebook.nbformat_minor,
        "loaded notebook"
    );
    Ok(notebook)
}

/// Single-line JSON with sorted keys and `", "` / `": "` separators.
pub fn to_canonical_json(notebook: &Notebook) -> Result<String> {
    let value = serde_json::to_value(notebook).context("failed to serialize notebook")?;
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value
        .serialize(&mut serializer)
        .context("failed to encode notebook JSON")?;
    String::from_utf8(out).context("encoded notebook is not UTF-8")
}

/// The on-disk text of a notebook, ending with a newline.
///
/// Transient metadata is dropped and multiline values are split into lines.
pub fn to_disk_json(notebook: &Notebook, settings: &WriteSettings) -> Result<String> {
    let mut split = notebook.clone();
    strip_transient(&mut split);
    split_lines(&mut split);

    let value = serde_json::to_value(&split).context("failed to serialize notebook")?;
    let indent = " ".repeat(settings.indent);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(
        &mut out,
        PrettyFormatter::with_indent(indent.as_bytes()),
    );
    value
        .serialize(&mut serializer)
        .context("failed to encode notebook JSON")?;
    out.push(b'\n');
    String::from_utf8(out).context("encoded notebook is not UTF-8")
}

/// Write a notebook to `path` in the on-disk format.
pub fn write_path(notebook: &Notebook, path: &Path, settings: &WriteSettings) -> Result<()> {
    let text = to_disk_json(notebook, settings)?;
    fs::write(path, text)
        .with_context(|| format!("failed to write notebook to {}", path.display()))?;

    tracing::debug!(
        path = %path.display(),
        cells = notebook.cells.len(),
        indent = settings.indent,
        "wrote notebook"
    );
    Ok(())
}

/// Compact formatter matching the separators of Python's `json.dumps`.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn flag_unknown_kinds(notebook: &Notebook) {
    for kind in notebook.unknown_cell_kinds() {
        tracing::warn!(cell_type = kind, "unrecognized cell type, rendering source only");
    }
    for kind in notebook.unknown_output_kinds() {
        tracing::warn!(output_type = kind, "unrecognized output type, skipping in view");
    }
}

fn is_json_mime(mime: &str) -> bool {
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn rejoined(text: &mut MultilineText) {
    if let MultilineText::Fragments(parts) = text {
        *text = MultilineText::Text(parts.concat());
    }
}

fn split(text: &mut MultilineText) {
    if let MultilineText::Text(whole) = text {
        *text = MultilineText::Fragments(split_keep_ends(whole));
    }
}

/// Characters that end a line, as recognised by Python's `str.splitlines`.
fn is_line_boundary(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\x0b'
            | '\x0c'
            | '\x1c'
            | '\x1d'
            | '\x1e'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Split after every line boundary, keeping it; `\r\n` counts as one.
fn split_keep_ends(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if !is_line_boundary(c) {
            continue;
        }
        let mut end = index + c.len_utf8();
        if c == '\r' {
            if let Some(&(next, '\n')) = chars.peek() {
                chars.next();
                end = next + 1;
            }
        }
        lines.push(text[start..end].to_string());
        start = end;
    }
    if start < text.len() {
        lines.push(text[start..].to_string());
    }
    lines
}

fn rejoin_bundle(bundle: &mut Map<String, Value>) {
    for (mime, value) in bundle.iter_mut() {
        if is_json_mime(mime) {
            continue;
        }
        let Value::Array(items) = value else {
            continue;
        };
        let joined = items
            .iter()
            .map(Value::as_str)
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.concat());
        if let Some(joined) = joined {
            *value = Value::String(joined);
        }
    }
}

fn split_bundle(bundle: &mut Map<String, Value>) {
    for (mime, value) in bundle.iter_mut() {
        if !(mime.starts_with("text/") || NON_TEXT_SPLIT_MIMES.contains(&mime.as_str())) {
            continue;
        }
        if let Value::String(text) = value {
            *value = Value::Array(split_keep_ends(text).into_iter().map(Value::String).collect());
        }
    }
}

fn attachment_bundles(cell: &mut Cell) -> impl Iterator<Item = &mut Map<String, Value>> {
    cell.extra
        .get_mut("attachments")
        .and_then(Value::as_object_mut)
        .into_iter()
        .flat_map(|attachments| attachments.values_mut())
        .filter_map(Value::as_object_mut)
}

/// Apply `text_fn` to every output text and `bundle_fn` to every MIME bundle.
fn for_each_output_value(
    output: &mut Output,
    text_fn: fn(&mut MultilineText),
    bundle_fn: fn(&mut Map<String, Value>),
) {
    match output {
        Output::Stream(stream) => text_fn(&mut stream.text),
        Output::ExecuteResult(rich) | Output::DisplayData(rich) => bundle_fn(&mut rich.data),
        Output::Error(_) => {}
        Output::Other { fields, .. } => {
            if let Some(data) = fields.get_mut("data").and_then(Value::as_object_mut) {
                bundle_fn(data);
            }
            if let Some(value) = fields.get_mut("text") {
                if let Some(mut text) = MultilineText::from_value(value) {
                    text_fn(&mut text);
                    if let Ok(updated) = serde_json::to_value(&text) {
                        *value = updated;
                    }
                }
            }
        }
    }
}

fn transform(
    notebook: &mut Notebook,
    text_fn: fn(&mut MultilineText),
    bundle_fn: fn(&mut Map<String, Value>),
) {
    for cell in &mut notebook.cells {
        text_fn(&mut cell.source);
        for bundle in attachment_bundles(cell) {
            bundle_fn(bundle);
        }
        for output in cell.outputs.iter_mut().flatten() {
            for_each_output_value(output, text_fn, bundle_fn);
        }
    }
}

/// Join list-of-lines values into single strings.
pub fn rejoin_lines(notebook: &mut Notebook) {
    transform(notebook, rejoined, rejoin_bundle);
}

/// Split multiline strings into lists of lines that keep their endings.
pub fn split_lines(notebook: &mut Notebook) {
    transform(notebook, split, split_bundle);
}

/// Drop metadata that describes only the loaded copy of a notebook.
pub fn strip_transient(notebook: &mut Notebook) {
    for key in TRANSIENT_METADATA {
        notebook.metadata.remove(key);
    }
    for cell in &mut notebook.cells {
        if let Some(metadata) = cell.extra.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove(TRANSIENT_CELL_METADATA);
        }
    }
}
