use std::collections::BTreeSet;

use super::statements_constants::{
    HARD_REQUIRED_SECTIONS, RECONCILIATION_REQUIRED_SECTIONS,
};
use super::statements_errors::{Result, StatementError};
use super::statements_model::SectionPreflightResult;

/// Validates the payload's section set against the frozen required matrix.
///
/// Parses only far enough to enumerate direct children of `FlexStatement`
/// elements; business content is never interpreted here.
pub fn check_required_sections(
    payload: &[u8],
    reconciliation_enabled: bool,
) -> Result<SectionPreflightResult> {
    let detected = extract_section_names(payload)?;

    let missing_hard_required: Vec<String> = HARD_REQUIRED_SECTIONS
        .iter()
        .filter(|section| !detected.contains(**section))
        .map(|section| section.to_string())
        .collect();

    let missing_reconciliation_required: Vec<String> = if reconciliation_enabled {
        RECONCILIATION_REQUIRED_SECTIONS
            .iter()
            .filter(|section| !detected.contains(**section))
            .map(|section| section.to_string())
            .collect()
    } else {
        Vec::new()
    };

    Ok(SectionPreflightResult {
        detected_sections: detected.into_iter().collect(),
        missing_hard_required,
        missing_reconciliation_required,
    })
}

/// Fails with the exact missing names when the preflight result is invalid.
pub fn ensure_required_sections(result: &SectionPreflightResult) -> Result<()> {
    if result.is_valid() {
        return Ok(());
    }
    Err(StatementError::MissingRequiredSections {
        missing: result.missing_sections(),
    })
}

fn extract_section_names(payload: &[u8]) -> Result<BTreeSet<String>> {
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

    let mut sections = BTreeSet::new();
    let mut found_statement = false;
    for statement in doc
        .descendants()
        .filter(|node| node.has_tag_name("FlexStatement"))
    {
        found_statement = true;
        for section in statement.children().filter(|node| node.is_element()) {
            let name = section.tag_name().name().trim();
            if !name.is_empty() {
                sections.insert(name.to_string());
            }
        }
    }

    if !found_statement {
        return Err(StatementError::InvalidPayload(
            "FlexStatement node not found in payload".to_string(),
        ));
    }

    Ok(sections)
}
