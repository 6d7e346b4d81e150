//! Result set accumulation.
//!
//! A [`ResultSetBuilder`] collects decoded rows against a fixed column list
//! and is consumed into a [`ResultSet`] when the terminal marker arrives.

use crate::error::{Error, ProtocolErrorKind};
use crate::messages::server::{BinaryRow, TextRow};
use crate::protocol::PacketReader;
use crate::types::{ColumnDef, decode_binary_value, decode_text_value};
use crate::value::Value;

/// A complete query result: column metadata plus decoded rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row and column index.
    pub fn get(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row)?.get(column)
    }
}

/// Accumulates rows for one result set.
#[derive(Debug)]
pub struct ResultSetBuilder {
    columns: Vec<ColumnDef>,
    rows: Vec<Vec<Value>>,
}

impl ResultSetBuilder {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Decode and append a text protocol row.
    pub fn add_text_row(&mut self, row: &TextRow) -> Result<(), Error> {
        if row.values.len() != self.columns.len() {
            return Err(Error::protocol(
                ProtocolErrorKind::Malformed,
                format!(
                    "row has {} cells, expected {}",
                    row.values.len(),
                    self.columns.len()
                ),
            ));
        }
        let decoded = row
            .values
            .iter()
            .zip(&self.columns)
            .map(|(cell, col)| match cell {
                None => Value::Null,
                Some(bytes) => decode_text_value(col.column_type, bytes, col.is_unsigned()),
            })
            .collect();
        self.rows.push(decoded);
        Ok(())
    }

    /// Decode and append a binary protocol row.
    ///
    /// The NULL bitmap leads the payload, offset by two bits; cells follow
    /// in column order with NULL columns absent.
    pub fn add_binary_row(&mut self, row: &BinaryRow) -> Result<(), Error> {
        let mut r = PacketReader::new(&row.payload);
        let bitmap_len = (self.columns.len() + 2).div_ceil(8);
        let bitmap = r
            .read_bytes(bitmap_len)
            .ok_or_else(|| {
                Error::protocol(ProtocolErrorKind::Malformed, "truncated NULL bitmap")
            })?
            .to_vec();

        let mut decoded = Vec::with_capacity(self.columns.len());
        for (i, col) in self.columns.iter().enumerate() {
            let bit = i + 2;
            if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
                decoded.push(Value::Null);
                continue;
            }
            let value = decode_binary_value(&mut r, col.column_type, col.is_unsigned())
                .ok_or_else(|| {
                    Error::protocol(
                        ProtocolErrorKind::Malformed,
                        format!("truncated binary cell for column `{}`", col.name),
                    )
                })?;
            decoded.push(value);
        }
        r.finish()?;
        self.rows.push(decoded);
        Ok(())
    }

    /// Consume the builder into the finished result set.
    pub fn finish(self) -> ResultSet {
        ResultSet {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;
    use crate::types::{FieldType, column_flags};

    fn column(name: &str, column_type: FieldType, flags: u16) -> ColumnDef {
        ColumnDef {
            catalog: "def".into(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: name.into(),
            org_name: name.into(),
            charset: 45,
            column_length: 255,
            column_type,
            flags,
            decimals: 0,
        }
    }

    #[test]
    fn text_rows_decode_per_column_type() {
        let mut builder = ResultSetBuilder::new(vec![
            column("id", FieldType::Long, column_flags::UNSIGNED),
            column("name", FieldType::VarString, 0),
        ]);

        builder
            .add_text_row(&TextRow {
                values: vec![Some(b"42".to_vec()), Some(b"alice".to_vec())],
            })
            .unwrap();
        builder
            .add_text_row(&TextRow {
                values: vec![Some(b"7".to_vec()), None],
            })
            .unwrap();

        let rs = builder.finish();
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.get(0, 0), Some(&Value::Int(42)));
        assert_eq!(rs.get(0, 1), Some(&Value::Text("alice".into())));
        assert_eq!(rs.get(1, 1), Some(&Value::Null));
        assert_eq!(rs.column_names().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    #[test]
    fn text_row_arity_mismatch_is_rejected() {
        let mut builder = ResultSetBuilder::new(vec![column("id", FieldType::Long, 0)]);
        let err = builder
            .add_text_row(&TextRow {
                values: vec![Some(b"1".to_vec()), Some(b"2".to_vec())],
            })
            .unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn binary_row_with_null_bitmap() {
        let mut builder = ResultSetBuilder::new(vec![
            column("id", FieldType::Long, 0),
            column("note", FieldType::VarString, 0),
        ]);

        // Second column NULL: bit index 3 in the bitmap.
        let mut w = PacketWriter::new();
        w.write_u8(0b0000_1000);
        w.write_u32_le(13);
        builder
            .add_binary_row(&BinaryRow {
                payload: w.into_bytes(),
            })
            .unwrap();

        let rs = builder.finish();
        assert_eq!(rs.get(0, 0), Some(&Value::Int(13)));
        assert_eq!(rs.get(0, 1), Some(&Value::Null));
    }

    #[test]
    fn binary_row_truncated_cell_is_rejected() {
        let mut builder = ResultSetBuilder::new(vec![column("id", FieldType::Long, 0)]);
        let err = builder
            .add_binary_row(&BinaryRow {
                payload: vec![0x00, 13, 0],
            })
            .unwrap_err();
        assert!(err.is_protocol_error());
    }
}
