use log::debug;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use super::ReportPayload;
use crate::error::{ApiError, ApiResult};

/// One unbundled part of a report, tied to the item it was generated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPart {
    pub item_id: String,
    pub content: String,
}

/// Splits a fetched payload into per-item parts.
///
/// A zip archive yields one part per file entry, in archive order, keyed by the
/// entry name without its `.csv` extension. Anything else is a single part for
/// the first requested item.
pub fn unbundle(payload: &ReportPayload, items: &[String]) -> ApiResult<Vec<ReportPart>> {
    if payload.is_zip() {
        return unzip(&payload.body);
    }

    let item_id = items
        .first()
        .cloned()
        .ok_or_else(|| ApiError::validation("Report request has no items"))?;
    let content = decode(payload.body.clone(), &item_id)?;
    Ok(vec![ReportPart { item_id, content }])
}

fn unzip(body: &[u8]) -> ApiResult<Vec<ReportPart>> {
    let mut archive = ZipArchive::new(Cursor::new(body))
        .map_err(|e| ApiError::invalid_response(format!("Failed to open report archive: {}", e)))?;
    debug!("Unbundling report archive with {} entries", archive.len());

    let mut parts = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|e| {
            ApiError::invalid_response(format!("Failed to read archive entry {}: {}", index, e))
        })?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let item_id = name.strip_suffix(".csv").unwrap_or(&name).to_string();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(|e| {
            ApiError::invalid_response(format!("Failed to extract {}: {}", name, e))
        })?;

        let content = decode(bytes, &item_id)?;
        parts.push(ReportPart { item_id, content });
    }
    Ok(parts)
}

fn decode(bytes: Vec<u8>, item_id: &str) -> ApiResult<String> {
    String::from_utf8(bytes).map_err(|e| {
        ApiError::invalid_response(format!("Report for {} is not valid UTF-8: {}", item_id, e))
    })
}
