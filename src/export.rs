//! CSV export of a processed snapshot

use crate::error::LedgerError;
use crate::models::CacheSnapshot;
use crate::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Date")]
    date: &'a str,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Category")]
    category: &'static str,
    #[serde(rename = "Amount")]
    amount: f64,
    #[serde(rename = "Type")]
    kind: &'static str,
}

/// Render incoming then outgoing entries as `Date,Description,Category,Amount,Type`.
///
/// Descriptions are the masked names; amounts stay non-negative and `Type`
/// carries the direction.
pub fn export_csv(snapshot: &CacheSnapshot) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    let rows = snapshot
        .incoming
        .iter()
        .map(|t| (t, "income"))
        .chain(snapshot.outgoing.iter().map(|t| (t, "expense")));

    for (t, kind) in rows {
        writer
            .serialize(CsvRow {
                date: &t.date,
                description: &t.name,
                category: t.category.label(),
                amount: t.amount,
                kind,
            })
            .map_err(|e| LedgerError::Export(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LedgerError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| LedgerError::Export(e.to_string()))
}
