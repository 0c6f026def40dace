//! Flattens a notebook into a line-oriented transcript.
//!
//! All functions are pure: they borrow the document and never touch I/O.

use crate::notebook::{Cell, CellKind, MultilineText, Notebook, Output};

/// Line that opens and closes a code cell's source.
pub const FENCE: &str = "```";

pub const STREAM_MARKER: &str = "---- output (stream) ----";
pub const TEXT_PLAIN_MARKER: &str = "---- output (text/plain) ----";
pub const ERROR_MARKER: &str = "---- output (error) ----";

/// Render every cell in document order.
///
/// Joining the result with `\n` gives a readable transcript of the notebook.
pub fn render(notebook: &Notebook) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, cell) in notebook.cells.iter().enumerate() {
        render_cell(index, cell, &mut lines);
    }
    lines
}

/// Header line that opens cell `index`.
pub fn cell_header(index: usize, kind: &CellKind) -> String {
    format!("# ==== Cell {index} ({kind}) ====")
}

/// Split text into display lines.
///
/// Trailing newlines are dropped as one run before splitting, so `"a\nb\n"`
/// gives `["a", "b"]` and an empty string gives no lines at all. Lines break
/// at `\n` and `\r\n`; a lone `\r` stays inside its line.
pub fn normalize_lines(text: &str) -> Vec<String> {
    text.trim_end_matches(|c: char| c == '\n' || c == '\r')
        .lines()
        .map(str::to_string)
        .collect()
}

fn text_lines(text: &MultilineText) -> Vec<String> {
    normalize_lines(&text.joined())
}

fn render_cell(index: usize, cell: &Cell, out: &mut Vec<String>) {
    out.push(cell_header(index, &cell.kind));

    if cell.kind == CellKind::Code {
        out.push(FENCE.to_string());
        out.extend(text_lines(&cell.source));
        out.push(FENCE.to_string());
        for output in cell.outputs() {
            render_output(output, out);
        }
    } else {
        out.extend(text_lines(&cell.source));
    }

    out.push(String::new());
}

fn render_output(output: &Output, out: &mut Vec<String>) {
    match output {
        Output::Stream(stream) => {
            out.push(STREAM_MARKER.to_string());
            out.extend(text_lines(&stream.text));
        }
        Output::ExecuteResult(rich) | Output::DisplayData(rich) => {
            if let Some(text) = rich.text_plain() {
                out.push(TEXT_PLAIN_MARKER.to_string());
                out.extend(text_lines(&text));
            }
        }
        Output::Error(error) => {
            out.push(ERROR_MARKER.to_string());
            out.extend(error.traceback.iter().cloned());
        }
        Output::Other { .. } => {}
    }
}
