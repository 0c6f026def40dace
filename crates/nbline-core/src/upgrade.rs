//! Upgrades nbformat 2 and 3 documents to the nbformat 4 layout.
//!
//! Older documents nest cells under `worksheets`, keep code in `input`, and
//! key output data by short names (`text`, `png`, ...) rather than MIME types.
//! The rewrite happens on raw JSON before the typed model is built.

use serde_json::{Map, Value};

use crate::notebook::MultilineText;

/// Oldest nbformat major version that can be upgraded.
pub const OLDEST_UPGRADABLE: u32 = 2;

/// Minor version stamped on upgraded documents. 4.0 predates cell ids.
pub const UPGRADED_MINOR: u32 = 0;

const MIME_KEYS: [(&str, &str); 8] = [
    ("text", "text/plain"),
    ("html", "text/html"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpeg", "image/jpeg"),
    ("latex", "text/latex"),
    ("json", "application/json"),
    ("javascript", "application/javascript"),
];

/// Output keys that stay on the output when the rest moves into `data`.
const OUTPUT_ENVELOPE: [&str; 3] = ["output_type", "execution_count", "metadata"];

/// Whether a document of major version `major` is rewritten by [`to_v4`].
pub fn is_upgradable(major: u64) -> bool {
    (u64::from(OLDEST_UPGRADABLE)..u64::from(crate::format::SUPPORTED_NBFORMAT)).contains(&major)
}

/// Rewrite a v2 or v3 document in place as nbformat 4.0.
///
/// The source version is recorded in `metadata.orig_nbformat` and
/// `metadata.orig_nbformat_minor`.
pub fn to_v4(doc: &mut Map<String, Value>, from: u64) {
    let from_minor = doc.get("nbformat_minor").and_then(Value::as_u64).unwrap_or(0);
    let orig_nbformat = doc.remove("orig_nbformat").unwrap_or(Value::from(from));
    let orig_minor = doc.remove("orig_nbformat_minor").unwrap_or(Value::from(from_minor));

    let mut metadata = take_object(doc, "metadata");
    metadata.remove("name");
    metadata.remove("signature");
    metadata.insert("orig_nbformat".to_string(), orig_nbformat);
    metadata.insert("orig_nbformat_minor".to_string(), orig_minor);
    doc.insert("metadata".to_string(), Value::Object(metadata));

    let cells: Vec<Value> = match doc.remove("worksheets") {
        Some(Value::Array(worksheets)) => worksheets
            .into_iter()
            .filter_map(|sheet| match sheet {
                Value::Object(mut sheet) => match sheet.remove("cells") {
                    Some(Value::Array(cells)) => Some(cells),
                    _ => None,
                },
                _ => None,
            })
            .flatten()
            .map(|cell| match cell {
                Value::Object(mut cell) => {
                    upgrade_cell(&mut cell);
                    Value::Object(cell)
                }
                other => other,
            })
            .collect(),
        _ => Vec::new(),
    };

    doc.insert("cells".to_string(), Value::Array(cells));
    doc.insert(
        "nbformat".to_string(),
        Value::from(crate::format::SUPPORTED_NBFORMAT),
    );
    doc.insert("nbformat_minor".to_string(), Value::from(UPGRADED_MINOR));
}

/// Remove the object stored at `key`; anything else yields an empty map.
fn take_object(map: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match map.remove(key) {
        Some(Value::Object(object)) => object,
        _ => Map::new(),
    }
}

fn upgrade_cell(cell: &mut Map<String, Value>) {
    let mut metadata = take_object(cell, "metadata");
    let kind = cell
        .get("cell_type")
        .and_then(Value::as_str)
        .map(str::to_string);

    match kind.as_deref() {
        Some("code") => {
            cell.remove("language");
            if let Some(collapsed) = cell.remove("collapsed") {
                metadata.insert("collapsed".to_string(), collapsed);
            }
            let source = cell.remove("input").unwrap_or_else(|| Value::from(""));
            cell.insert("source".to_string(), source);
            let count = cell.remove("prompt_number").unwrap_or(Value::Null);
            cell.insert("execution_count".to_string(), count);

            let outputs = match cell.remove("outputs") {
                Some(Value::Array(outputs)) => outputs
                    .into_iter()
                    .map(|output| match output {
                        Value::Object(mut output) => {
                            upgrade_output(&mut output);
                            Value::Object(output)
                        }
                        other => other,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            cell.insert("outputs".to_string(), Value::Array(outputs));
        }
        Some("heading") => {
            let level = cell
                .remove("level")
                .and_then(|level| level.as_u64())
                .unwrap_or(1);
            let text = cell
                .get("source")
                .and_then(MultilineText::from_value)
                .unwrap_or_default();
            let single_line = text.joined().lines().collect::<Vec<_>>().join(" ");
            let hashes = "#".repeat(usize::try_from(level).unwrap_or(1));
            cell.insert(
                "source".to_string(),
                Value::String(format!("{hashes} {single_line}")),
            );
            cell.insert("cell_type".to_string(), Value::from("markdown"));
        }
        Some("html") => {
            cell.insert("cell_type".to_string(), Value::from("markdown"));
        }
        _ => {}
    }

    cell.insert("metadata".to_string(), Value::Object(metadata));
}

fn upgrade_output(output: &mut Map<String, Value>) {
    let kind = output
        .get("output_type")
        .and_then(Value::as_str)
        .map(str::to_string);

    match kind.as_deref() {
        Some(kind @ ("pyout" | "display_data")) => {
            if kind == "pyout" {
                output.insert("output_type".to_string(), Value::from("execute_result"));
                let count = output.remove("prompt_number").unwrap_or(Value::Null);
                output.insert("execution_count".to_string(), count);
            }

            let keys: Vec<String> = output
                .keys()
                .filter(|key| !OUTPUT_ENVELOPE.contains(&key.as_str()))
                .cloned()
                .collect();
            let mut data = Map::new();
            for key in keys {
                if let Some(value) = output.remove(&key) {
                    data.insert(key, value);
                }
            }
            to_mime_keys(&mut data);
            let parsed_json = match data.get("application/json") {
                Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok(),
                _ => None,
            };
            if let Some(parsed) = parsed_json {
                data.insert("application/json".to_string(), parsed);
            }
            output.insert("data".to_string(), Value::Object(data));
            let mut metadata = take_object(output, "metadata");
            to_mime_keys(&mut metadata);
            output.insert("metadata".to_string(), Value::Object(metadata));
        }
        Some("pyerr") => {
            output.insert("output_type".to_string(), Value::from("error"));
        }
        Some("stream") => {
            let name = output.remove("stream").unwrap_or_else(|| Value::from("stdout"));
            output.insert("name".to_string(), name);
        }
        _ => {}
    }
}

fn to_mime_keys(map: &mut Map<String, Value>) {
    for (short, mime) in MIME_KEYS {
        if let Some(value) = map.remove(short) {
            map.insert(mime.to_string(), value);
        }
    }
}
