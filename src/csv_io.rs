use std::io::{Read, Write};

use crate::columns::normalize_columns;
use crate::error::CsvError;
use crate::features::RawRow;
use crate::pipeline::PredictionRecord;

pub const PREDICTED_STRESS: &str = "Predicted Stress";
pub const CAUSE: &str = "Cause";
pub const RULE_BASED_ADVICE: &str = "Rule_Based_Advice";
pub const AI_FERTILIZER_ADVICE: &str = "AI_Fertilizer_Advice";

/// Read a farm table. Headers are normalized; ragged rows are an error.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<RawRow>, CsvError> {
    read_table(reader).map(|(_, rows)| rows)
}

/// Like [`read_rows`], but also returns the normalized header row, which
/// survives even when the table has no data rows.
pub fn read_table<R: Read>(reader: R) -> Result<(Vec<String>, Vec<RawRow>), CsvError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let raw_headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if raw_headers.is_empty() {
        return Err(CsvError::MissingHeader);
    }
    let headers = normalize_columns(&raw_headers);

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        rows.push(RawRow::from_pairs(
            headers.iter().cloned().zip(rec.iter().map(str::to_string)),
        ));
    }
    Ok((headers, rows))
}

/// Write `columns` (in the given order) followed by the four derived columns.
/// A record missing one of `columns` gets an empty cell.
pub fn write_records<W: Write>(
    writer: W,
    columns: &[String],
    records: &[PredictionRecord],
) -> Result<(), CsvError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
    header.extend([PREDICTED_STRESS, CAUSE, RULE_BASED_ADVICE, AI_FERTILIZER_ADVICE]);
    wtr.write_record(&header)?;

    for record in records {
        let mut out: Vec<&str> = Vec::with_capacity(header.len());
        let cells: Vec<(&str, &str)> = record.source.iter().collect();
        for (i, name) in columns.iter().enumerate() {
            // positional hit in the common case; look up by name otherwise
            let value = match cells.get(i) {
                Some(&(k, v)) if k == name.as_str() => v,
                _ => record.source.get(name).unwrap_or(""),
            };
            out.push(value);
        }
        out.push(record.stress.as_str());
        out.push(&record.cause);
        out.push(&record.rule_based_advice);
        out.push(&record.ai_fertilizer_advice);
        wtr.write_record(&out)?;
    }
    wtr.flush()?;
    Ok(())
}
