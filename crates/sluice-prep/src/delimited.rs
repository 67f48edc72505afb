//! Delimited-text codec for tables.
//!
//! Semicolon-delimited, double-quote quoted where needed, one header row,
//! no index column. Missing values are empty fields.

use crate::table::{Table, TableError};
use crate::value::Value;
use std::io::{Read, Write};

pub const DELIMITER: u8 = b';';
pub const QUOTE: u8 = b'"';

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Table(#[from] TableError),
}

pub(crate) fn writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .from_writer(out)
}

/// Write `table` with its header row. A table without columns is written
/// as an empty artifact.
pub fn write_table<W: Write>(table: &Table, out: W) -> Result<(), CsvError> {
    if table.n_cols() == 0 {
        return Ok(());
    }
    let mut wtr = writer(out);
    wtr.write_record(table.columns())?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(Value::to_string))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read a table written by [`write_table`]. Cell types are re-inferred.
pub fn read_table<R: Read>(input: R) -> Result<Table, CsvError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .has_headers(true)
        .from_reader(input);

    let headers = rdr.headers()?.clone();
    // A lone empty field is how a zero-column header reads back.
    if headers.is_empty() || (headers.len() == 1 && headers[0].is_empty()) {
        return Ok(Table::default());
    }

    let mut table = Table::new(headers.iter())?;
    for record in rdr.records() {
        let record = record?;
        table.push_row(record.iter().map(Value::parse_cell).collect())?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_json(
            r#"[{"id":1,"title":"semi;colon","body":"say \"hi\"","score":1.0},
                {"id":2,"title":"plain","body":null,"score":2.5}]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_write_layout() {
        let mut out = Vec::new();
        write_table(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "id;title;body;score");
        assert_eq!(lines[1], r#"1;"semi;colon";"say ""hi""";1.0"#);
        assert_eq!(lines[2], "2;plain;;2.5");
    }

    #[test]
    fn test_read_back_preserves_cells() {
        let mut out = Vec::new();
        write_table(&sample(), &mut out).unwrap();

        let table = read_table(out.as_slice()).unwrap();
        assert_eq!(table, sample());
    }

    #[test]
    fn test_read_rejects_ragged_rows() {
        let err = read_table("a;b\n1;2;3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CsvError::Csv(_)));
    }

    #[test]
    fn test_empty_document_round_trips_without_columns() {
        let empty = Table::from_json("[]").unwrap();
        let mut out = Vec::new();
        write_table(&empty, &mut out).unwrap();
        assert!(out.is_empty());

        assert_eq!(read_table(out.as_slice()).unwrap(), Table::default());
        assert_eq!(read_table("\"\"\n".as_bytes()).unwrap().n_cols(), 0);
    }

    #[test]
    fn test_read_header_only() {
        let table = read_table("a;b\n".as_bytes()).unwrap();
        assert_eq!(table.columns(), &["a", "b"]);
        assert_eq!(table.n_rows(), 0);
    }
}
