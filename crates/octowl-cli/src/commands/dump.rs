use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{Map, Value as Json, json};

use octowl_core::{Dataset, Element, FileMeta, Value, part10};

use crate::cli::OutputFormat;
use crate::output::print_json;

const MAX_BINARY_PREVIEW: usize = 16;

pub fn run(file: &Path, format: OutputFormat) -> Result<()> {
    let (meta, dataset) = part10::read_file_with_meta(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "meta": meta_json(&meta),
            "dataset": dataset_json(&dataset),
        }))?,
        OutputFormat::Table => {
            println!("{}: {}", "File".cyan(), file.display());
            println!("{}: {}", "Transfer Syntax".cyan(), meta.transfer_syntax_uid);
            println!("{}: {}", "SOP Class".cyan(), meta.media_storage_sop_class_uid);
            println!("{}: {}", "SOP Instance".cyan(), meta.media_storage_sop_instance_uid);
            for line in tree_lines(&dataset) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// Render `dataset` one element per line, items indented under their sequence.
pub fn tree_lines(dataset: &Dataset) -> Vec<String> {
    let mut lines = Vec::new();
    push_lines(&mut lines, dataset, 0);
    lines
}

fn push_lines(lines: &mut Vec<String>, dataset: &Dataset, depth: usize) {
    let indent = "  ".repeat(depth);
    for (tag, element) in dataset.iter() {
        match &element.value {
            Value::Sequence(items) => {
                lines.push(format!("{indent}{tag} SQ ({} items)", items.len()));
                for (n, item) in items.iter().enumerate() {
                    lines.push(format!("{indent}  Item #{n}"));
                    push_lines(lines, item, depth + 2);
                }
            }
            Value::Bytes(_) => {
                lines.push(format!("{indent}{tag} {} {}", element.vr, display_value(element)));
            }
        }
    }
}

fn display_value(element: &Element) -> String {
    let bytes = element.as_bytes().unwrap_or_default();
    if element.vr.is_text() {
        let text = String::from_utf8_lossy(bytes);
        return format!("[{}]", text.trim_end_matches([' ', '\0']));
    }
    let preview: Vec<String> = bytes
        .iter()
        .take(MAX_BINARY_PREVIEW)
        .map(|b| format!("{b:02x}"))
        .collect();
    let ellipsis = if bytes.len() > MAX_BINARY_PREVIEW { " .." } else { "" };
    format!("<{} bytes: {}{ellipsis}>", bytes.len(), preview.join(" "))
}

fn meta_json(meta: &FileMeta) -> Json {
    json!({
        "mediaStorageSopClassUid": meta.media_storage_sop_class_uid,
        "mediaStorageSopInstanceUid": meta.media_storage_sop_instance_uid,
        "transferSyntaxUid": meta.transfer_syntax_uid,
        "implementationClassUid": meta.implementation_class_uid,
        "implementationVersionName": meta.implementation_version_name,
    })
}

/// Tag-keyed JSON object, `GGGGEEEE` keys with `vr` plus `value` or `items`.
pub fn dataset_json(dataset: &Dataset) -> Json {
    let mut object = Map::new();
    for (tag, element) in dataset.iter() {
        let key = format!("{:04X}{:04X}", tag.group(), tag.element());
        let entry = match &element.value {
            Value::Sequence(items) => json!({
                "vr": element.vr.as_str(),
                "items": items.iter().map(dataset_json).collect::<Vec<_>>(),
            }),
            Value::Bytes(bytes) if element.vr.is_text() => json!({
                "vr": element.vr.as_str(),
                "value": String::from_utf8_lossy(bytes).trim_end_matches([' ', '\0']),
            }),
            Value::Bytes(bytes) => json!({
                "vr": element.vr.as_str(),
                "length": bytes.len(),
            }),
        };
        object.insert(key, entry);
    }
    Json::Object(object)
}
