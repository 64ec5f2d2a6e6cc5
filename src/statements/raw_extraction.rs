use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::statements_errors::{Result, StatementError};
use super::statements_model::{ExtractedRow, ExtractionResult};

/// Attribute keys that give a row a stable upstream identity, in preference order.
const PREFERRED_ROW_ID_KEYS: [&str; 11] = [
    "transactionID",
    "transactionId",
    "tradeID",
    "tradeId",
    "actionID",
    "actionId",
    "ibExecID",
    "ibExecId",
    "execID",
    "execId",
    "id",
];

/// Extracts every section row under `FlexStatement` elements for raw persistence.
///
/// Extraction is permissive about section names (unknown sections are recorded)
/// but the payload itself must be well-formed XML with at least one statement.
pub fn extract_payload_rows(payload: &[u8]) -> Result<ExtractionResult> {
    if payload.is_empty() {
        return Err(StatementError::InvalidPayload(
            "payload must not be empty".to_string(),
        ));
    }

    let text = std::str::from_utf8(payload).map_err(|_| {
        StatementError::InvalidPayload("payload is not valid UTF-8".to_string())
    })?;
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| StatementError::InvalidPayload(format!("payload is not valid XML: {}", e)))?;

    let statements: Vec<roxmltree::Node> = doc
        .descendants()
        .filter(|node| node.has_tag_name("FlexStatement"))
        .collect();
    if statements.is_empty() {
        return Err(StatementError::InvalidPayload(
            "FlexStatement node not found in payload".to_string(),
        ));
    }

    let report_date_local = extract_report_date_local(&statements[0]);
    let mut rows: Vec<ExtractedRow> = Vec::new();

    for statement in &statements {
        for section in statement.children().filter(|node| node.is_element()) {
            let section_name = section.tag_name().name().trim().to_string();
            if section_name.is_empty() {
                continue;
            }

            let section_rows: Vec<roxmltree::Node> =
                section.children().filter(|node| node.is_element()).collect();

            if section_rows.is_empty() {
                rows.push(ExtractedRow {
                    section_name: section_name.clone(),
                    source_row_ref: format!("{}:section:1", section_name),
                    source_payload: attribute_map(&section),
                });
                continue;
            }

            for (row_index, row) in section_rows.iter().enumerate() {
                let payload = attribute_map(row);
                let source_row_ref = build_source_row_ref(
                    &section_name,
                    row.tag_name().name(),
                    &payload,
                    row_index + 1,
                );
                rows.push(ExtractedRow {
                    section_name: section_name.clone(),
                    source_row_ref,
                    source_payload: payload,
                });
            }
        }
    }

    Ok(ExtractionResult {
        report_date_local,
        rows,
    })
}

fn attribute_map(node: &roxmltree::Node) -> BTreeMap<String, String> {
    node.attributes()
        .map(|attr| (attr.name().to_string(), attr.value().to_string()))
        .collect()
}

fn extract_report_date_local(statement: &roxmltree::Node) -> Option<NaiveDate> {
    for key in ["reportDate", "toDate"] {
        if let Some(candidate) = statement.attribute(key) {
            if let Some(parsed) = try_parse_local_date(candidate) {
                return Some(parsed);
            }
        }
    }
    None
}

fn try_parse_local_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

/// Deterministic row handle: the row's own IBKR id when present, else its
/// 1-based index within the section.
fn build_source_row_ref(
    section_name: &str,
    row_tag: &str,
    payload: &BTreeMap<String, String>,
    row_index: usize,
) -> String {
    for key in PREFERRED_ROW_ID_KEYS {
        if let Some(value) = payload.get(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return format!("{}:{}:{}={}", section_name, row_tag, key, trimmed);
            }
        }
    }
    format!("{}:{}:idx={}", section_name, row_tag, row_index)
}
