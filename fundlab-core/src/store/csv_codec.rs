//! CSV encoding of one ticker's records.

use std::path::Path;

use super::StoreError;
use crate::domain::{TickerRecord, Value};
use crate::schema::ColumnSchema;

/// Encode records as CSV bytes: header of schema keys, one line per record.
///
/// Output depends only on the schema and the records, so equal inputs give
/// byte-identical files.
pub fn encode(
    schema: &ColumnSchema,
    records: &[TickerRecord],
    path: &Path,
) -> Result<Vec<u8>, StoreError> {
    let io_err = |e: csv::Error| StoreError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::from(e),
    };

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(schema.keys()).map_err(io_err)?;
    for record in records {
        writer
            .write_record(record.values.iter().map(Value::to_cell))
            .map_err(io_err)?;
    }
    writer.into_inner().map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e.into_error(),
    })
}

/// Decode CSV bytes into records sorted by period.
///
/// Columns are matched by header name: header columns the schema does not
/// know are ignored, schema columns absent from the header read as null.
/// The period columns must be present, and no period may repeat.
pub fn decode(
    schema: &ColumnSchema,
    bytes: &[u8],
    path: &Path,
) -> Result<Vec<TickerRecord>, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| corrupt(format!("header: {e}")))?
        .clone();
    if headers.is_empty() {
        return Err(corrupt("empty file".into()));
    }

    let positions: Vec<Option<usize>> = schema
        .columns()
        .iter()
        .map(|col| headers.iter().position(|h| h.trim() == col.key))
        .collect();

    for (name, _) in schema.kind().period_columns() {
        let missing = schema
            .position(name)
            .and_then(|i| positions[i])
            .is_none();
        if missing {
            return Err(corrupt(format!("missing period column '{name}'")));
        }
    }

    let mut records = Vec::new();
    for (n, row) in reader.records().enumerate() {
        // Line numbers are 1-based and the header is line 1.
        let line = n + 2;
        let row = row.map_err(|e| corrupt(format!("line {line}: {e}")))?;

        let values = schema
            .columns()
            .iter()
            .zip(&positions)
            .map(|(col, pos)| match pos {
                None => Ok(Value::Null),
                Some(i) => Value::from_cell(row.get(*i).unwrap_or(""), col.dtype)
                    .map_err(|e| corrupt(format!("line {line}, column '{}': {e}", col.key))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record = TickerRecord::new(schema, values)
            .map_err(|e| corrupt(format!("line {line}: {e}")))?;
        records.push(record);
    }

    records.sort_by_key(|r| r.period);
    if let Some(pair) = records.windows(2).find(|w| w[0].period == w[1].period) {
        return Err(corrupt(format!("duplicate period {}", pair[0].period)));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnType, DataKind, Period};
    use crate::schema::ColumnDefinition;

    fn schema() -> ColumnSchema {
        ColumnSchema::new(
            DataKind::Quarter,
            vec![
                ColumnDefinition::new("fiscal_year", "Fiscal year", ColumnType::Number),
                ColumnDefinition::new("fiscal_quarter", "Fiscal quarter", ColumnType::Number),
                ColumnDefinition::new("net_sales", "Net sales", ColumnType::Number),
                ColumnDefinition::new("title", "Title", ColumnType::String),
            ],
        )
        .unwrap()
    }

    fn path() -> &'static Path {
        Path::new("quarter/1301.csv")
    }

    #[test]
    fn encode_writes_header_and_quotes_text() {
        let schema = schema();
        let rec = TickerRecord::new(
            &schema,
            vec![
                Value::Number(2020.0),
                Value::Number(4.0),
                Value::Number(1500.5),
                Value::Text("Report, annual".into()),
            ],
        )
        .unwrap();
        let bytes = encode(&schema, &[rec], path()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "fiscal_year,fiscal_quarter,net_sales,title\n2020,4,1500.5,\"Report, annual\"\n"
        );
    }

    #[test]
    fn decode_sorts_and_matches_columns_by_name() {
        let csv = "net_sales,fiscal_quarter,fiscal_year,unknown\n20,1,2021,x\n10,4,2020,y\n";
        let records = decode(&schema(), csv.as_bytes(), path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].period,
            Period::Quarter {
                fiscal_year: 2020,
                fiscal_quarter: 4
            }
        );
        assert_eq!(records[0].value(2), &Value::Number(10.0));
        // "title" is absent from the header
        assert_eq!(records[0].value(3), &Value::Null);
    }

    #[test]
    fn decode_rejects_corrupt_content() {
        let schema = schema();
        for csv in [
            "",
            "net_sales\n10\n",
            "fiscal_year,fiscal_quarter,net_sales\n2020,4,abc\n",
            "fiscal_year,fiscal_quarter,net_sales\n2020,4\n",
            "fiscal_year,fiscal_quarter,net_sales\n2020,4,1\n2020,4,2\n",
        ] {
            let err = decode(&schema, csv.as_bytes(), path()).unwrap_err();
            assert!(matches!(err, StoreError::Corrupt { .. }), "{csv:?} gave {err}");
        }
    }
}
