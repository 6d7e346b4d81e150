//! MySQL field types and value codecs.
//!
//! Text protocol cells arrive as strings; binary protocol cells use
//! type-specific little-endian encodings, with temporals in the
//! length-prefixed component format.

use crate::protocol::{PacketReader, PacketWriter};
use crate::value::Value;

/// MySQL field type codes (the `MYSQL_TYPE_*` constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0A,
    Time = 0x0B,
    DateTime = 0x0C,
    Year = 0x0D,
    NewDate = 0x0E,
    VarChar = 0x0F,
    Bit = 0x10,
    Timestamp2 = 0x11,
    DateTime2 = 0x12,
    Time2 = 0x13,
    Json = 0xF5,
    NewDecimal = 0xF6,
    Enum = 0xF7,
    Set = 0xF8,
    TinyBlob = 0xF9,
    MediumBlob = 0xFA,
    LongBlob = 0xFB,
    Blob = 0xFC,
    VarString = 0xFD,
    String = 0xFE,
    Geometry = 0xFF,
}

impl FieldType {
    /// Parse a field type from a byte. Unknown codes map to `String`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => FieldType::Decimal,
            0x01 => FieldType::Tiny,
            0x02 => FieldType::Short,
            0x03 => FieldType::Long,
            0x04 => FieldType::Float,
            0x05 => FieldType::Double,
            0x06 => FieldType::Null,
            0x07 => FieldType::Timestamp,
            0x08 => FieldType::LongLong,
            0x09 => FieldType::Int24,
            0x0A => FieldType::Date,
            0x0B => FieldType::Time,
            0x0C => FieldType::DateTime,
            0x0D => FieldType::Year,
            0x0E => FieldType::NewDate,
            0x0F => FieldType::VarChar,
            0x10 => FieldType::Bit,
            0x11 => FieldType::Timestamp2,
            0x12 => FieldType::DateTime2,
            0x13 => FieldType::Time2,
            0xF5 => FieldType::Json,
            0xF6 => FieldType::NewDecimal,
            0xF7 => FieldType::Enum,
            0xF8 => FieldType::Set,
            0xF9 => FieldType::TinyBlob,
            0xFA => FieldType::MediumBlob,
            0xFB => FieldType::LongBlob,
            0xFC => FieldType::Blob,
            0xFD => FieldType::VarString,
            0xFE => FieldType::String,
            0xFF => FieldType::Geometry,
            _ => FieldType::String,
        }
    }

    /// Check if this is a date/time type.
    pub const fn is_temporal(self) -> bool {
        matches!(
            self,
            FieldType::Date
                | FieldType::Time
                | FieldType::DateTime
                | FieldType::Timestamp
                | FieldType::NewDate
                | FieldType::Timestamp2
                | FieldType::DateTime2
                | FieldType::Time2
        )
    }

    /// Check if this is a binary/blob type.
    pub const fn is_blob(self) -> bool {
        matches!(
            self,
            FieldType::TinyBlob
                | FieldType::MediumBlob
                | FieldType::LongBlob
                | FieldType::Blob
                | FieldType::Geometry
        )
    }
}

/// Column flags in result set metadata.
#[allow(dead_code)]
pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNIQUE_KEY: u16 = 4;
    pub const MULTIPLE_KEY: u16 = 8;
    pub const BLOB: u16 = 16;
    pub const UNSIGNED: u16 = 32;
    pub const ZEROFILL: u16 = 64;
    pub const BINARY: u16 = 128;
    pub const ENUM: u16 = 256;
    pub const AUTO_INCREMENT: u16 = 512;
    pub const TIMESTAMP: u16 = 1024;
    pub const SET: u16 = 2048;
    pub const NO_DEFAULT_VALUE: u16 = 4096;
    pub const ON_UPDATE_NOW: u16 = 8192;
    pub const NUM: u16 = 32768;
}

/// Column definition from a result set or prepare response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Catalog name (always "def")
    pub catalog: String,
    /// Schema (database) name
    pub schema: String,
    /// Table name (or alias)
    pub table: String,
    /// Original table name
    pub org_table: String,
    /// Column name (or alias)
    pub name: String,
    /// Original column name
    pub org_name: String,
    /// Character set number
    pub charset: u16,
    /// Column length
    pub column_length: u32,
    /// Column type
    pub column_type: FieldType,
    /// Column flags
    pub flags: u16,
    /// Number of decimals
    pub decimals: u8,
}

impl ColumnDef {
    /// Check if the column is NOT NULL.
    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    /// Check if the column is unsigned.
    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    /// Check if the column is binary.
    pub const fn is_binary(&self) -> bool {
        self.flags & column_flags::BINARY != 0
    }
}

/// Decode a text protocol cell based on the column type.
pub fn decode_text_value(field_type: FieldType, data: &[u8], is_unsigned: bool) -> Value {
    let text = String::from_utf8_lossy(data);

    match field_type {
        FieldType::Tiny => {
            if is_unsigned {
                text.parse::<u8>().map_or_else(
                    |_| Value::Text(text.into_owned()),
                    |v| Value::TinyInt(v as i8),
                )
            } else {
                text.parse::<i8>()
                    .map_or_else(|_| Value::Text(text.into_owned()), Value::TinyInt)
            }
        }
        FieldType::Short | FieldType::Year => {
            if is_unsigned {
                text.parse::<u16>().map_or_else(
                    |_| Value::Text(text.into_owned()),
                    |v| Value::SmallInt(v as i16),
                )
            } else {
                text.parse::<i16>()
                    .map_or_else(|_| Value::Text(text.into_owned()), Value::SmallInt)
            }
        }
        FieldType::Long | FieldType::Int24 => {
            if is_unsigned {
                text.parse::<u32>()
                    .map_or_else(|_| Value::Text(text.into_owned()), |v| Value::Int(v as i32))
            } else {
                text.parse::<i32>()
                    .map_or_else(|_| Value::Text(text.into_owned()), Value::Int)
            }
        }
        FieldType::LongLong => {
            if is_unsigned {
                text.parse::<u64>().map_or_else(
                    |_| Value::Text(text.into_owned()),
                    |v| Value::BigInt(v as i64),
                )
            } else {
                text.parse::<i64>()
                    .map_or_else(|_| Value::Text(text.into_owned()), Value::BigInt)
            }
        }

        FieldType::Float => text
            .parse::<f32>()
            .map_or_else(|_| Value::Text(text.into_owned()), Value::Float),

        FieldType::Double => text
            .parse::<f64>()
            .map_or_else(|_| Value::Text(text.into_owned()), Value::Double),

        // Keep as text to preserve precision.
        FieldType::Decimal | FieldType::NewDecimal => Value::Decimal(text.into_owned()),

        FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob
        | FieldType::Geometry
        | FieldType::Bit => Value::Bytes(data.to_vec()),

        FieldType::Json => {
            serde_json::from_str(&text).map_or_else(|_| Value::Text(text.into_owned()), Value::Json)
        }

        FieldType::Null => Value::Null,

        FieldType::Date | FieldType::NewDate => parse_text_date(&text)
            .map_or_else(|| Value::Text(text.into_owned()), Value::Date),

        FieldType::Time | FieldType::Time2 => parse_text_time(&text)
            .map_or_else(|| Value::Text(text.into_owned()), Value::Time),

        FieldType::DateTime
        | FieldType::DateTime2
        | FieldType::Timestamp
        | FieldType::Timestamp2 => parse_text_datetime(&text)
            .map_or_else(|| Value::Text(text.into_owned()), Value::Timestamp),

        _ => Value::Text(text.into_owned()),
    }
}

/// Decode one binary protocol cell, consuming exactly its bytes.
///
/// Returns `None` on truncated input.
pub fn decode_binary_value(
    r: &mut PacketReader<'_>,
    field_type: FieldType,
    is_unsigned: bool,
) -> Option<Value> {
    // Signed and unsigned share the same Value width; interpretation of the
    // sign bit is left to the caller.
    let _ = is_unsigned;

    match field_type {
        FieldType::Tiny => r.read_u8().map(|v| Value::TinyInt(v as i8)),
        FieldType::Short | FieldType::Year => r.read_u16_le().map(|v| Value::SmallInt(v as i16)),
        FieldType::Long | FieldType::Int24 => r.read_u32_le().map(|v| Value::Int(v as i32)),
        FieldType::LongLong => r.read_u64_le().map(|v| Value::BigInt(v as i64)),
        FieldType::Float => r.read_u32_le().map(|v| Value::Float(f32::from_bits(v))),
        FieldType::Double => r.read_u64_le().map(|v| Value::Double(f64::from_bits(v))),

        FieldType::Decimal | FieldType::NewDecimal => r
            .read_lenenc_bytes()
            .map(|b| Value::Decimal(String::from_utf8_lossy(b).into_owned())),

        FieldType::Json => r.read_lenenc_bytes().map(|b| {
            serde_json::from_slice(b).map_or_else(|_| Value::Bytes(b.to_vec()), Value::Json)
        }),

        FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob
        | FieldType::Geometry
        | FieldType::Bit => r.read_lenenc_bytes().map(|b| Value::Bytes(b.to_vec())),

        FieldType::Date | FieldType::NewDate => decode_binary_date(r),
        FieldType::Time | FieldType::Time2 => decode_binary_time(r),
        FieldType::DateTime | FieldType::DateTime2 | FieldType::Timestamp | FieldType::Timestamp2 => {
            decode_binary_datetime(r)
        }

        FieldType::Null => Some(Value::Null),

        _ => r
            .read_lenenc_bytes()
            .map(|b| Value::Text(String::from_utf8_lossy(b).into_owned())),
    }
}

/// Encode a parameter value in binary protocol form.
///
/// NULL writes nothing; it is carried by the execute packet's NULL bitmap.
pub fn encode_binary_value(writer: &mut PacketWriter, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => writer.write_u8(u8::from(*b)),
        Value::TinyInt(i) => writer.write_u8(*i as u8),
        Value::SmallInt(i) => writer.write_u16_le(*i as u16),
        Value::Int(i) => writer.write_u32_le(*i as u32),
        Value::BigInt(i) => writer.write_u64_le(*i as u64),
        Value::Float(f) => writer.write_bytes(&f.to_le_bytes()),
        Value::Double(f) => writer.write_bytes(&f.to_le_bytes()),
        Value::Decimal(s) => writer.write_lenenc_string(s),
        Value::Text(s) => writer.write_lenenc_string(s),
        Value::Bytes(b) => writer.write_lenenc_bytes(b),
        Value::Json(j) => writer.write_lenenc_string(&j.to_string()),
        Value::Date(days) => encode_binary_date(writer, *days),
        Value::Time(micros) => encode_binary_time(writer, *micros),
        Value::Timestamp(micros) => encode_binary_datetime(writer, *micros),
    }
}

/// Pick the wire field type used to describe a parameter value.
pub fn value_field_type(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Bool(_) | Value::TinyInt(_) => FieldType::Tiny,
        Value::SmallInt(_) => FieldType::Short,
        Value::Int(_) => FieldType::Long,
        Value::BigInt(_) => FieldType::LongLong,
        Value::Float(_) => FieldType::Float,
        Value::Double(_) => FieldType::Double,
        Value::Decimal(_) => FieldType::NewDecimal,
        Value::Text(_) => FieldType::VarString,
        Value::Bytes(_) => FieldType::Blob,
        Value::Json(_) => FieldType::Json,
        Value::Date(_) => FieldType::Date,
        Value::Time(_) => FieldType::Time,
        Value::Timestamp(_) => FieldType::DateTime,
    }
}

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

fn decode_binary_date(r: &mut PacketReader<'_>) -> Option<Value> {
    match r.read_u8()? {
        0 => Some(Value::Date(0)),
        4 => {
            let year = i32::from(r.read_u16_le()?);
            let month = u32::from(r.read_u8()?);
            let day = u32::from(r.read_u8()?);
            Some(Value::Date(ymd_to_days(year, month, day)))
        }
        _ => None,
    }
}

fn decode_binary_time(r: &mut PacketReader<'_>) -> Option<Value> {
    let len = r.read_u8()?;
    match len {
        0 => Some(Value::Time(0)),
        8 | 12 => {
            let negative = r.read_u8()? != 0;
            let days = i64::from(r.read_u32_le()?);
            let hours = i64::from(r.read_u8()?);
            let minutes = i64::from(r.read_u8()?);
            let seconds = i64::from(r.read_u8()?);
            let micros = if len == 12 {
                i64::from(r.read_u32_le()?)
            } else {
                0
            };
            let total =
                ((days * 24 + hours) * 3600 + minutes * 60 + seconds) * MICROS_PER_SECOND + micros;
            Some(Value::Time(if negative { -total } else { total }))
        }
        _ => None,
    }
}

fn decode_binary_datetime(r: &mut PacketReader<'_>) -> Option<Value> {
    let len = r.read_u8()?;
    match len {
        0 => Some(Value::Timestamp(0)),
        4 | 7 | 11 => {
            let year = i32::from(r.read_u16_le()?);
            let month = u32::from(r.read_u8()?);
            let day = u32::from(r.read_u8()?);
            let mut micros = i64::from(ymd_to_days(year, month, day)) * MICROS_PER_DAY;
            if len >= 7 {
                let hours = i64::from(r.read_u8()?);
                let minutes = i64::from(r.read_u8()?);
                let seconds = i64::from(r.read_u8()?);
                micros += (hours * 3600 + minutes * 60 + seconds) * MICROS_PER_SECOND;
            }
            if len == 11 {
                micros += i64::from(r.read_u32_le()?);
            }
            Some(Value::Timestamp(micros))
        }
        _ => None,
    }
}

fn encode_binary_date(writer: &mut PacketWriter, days: i32) {
    let (year, month, day) = days_to_ymd(days);
    writer.write_u8(4);
    writer.write_u16_le(year as u16);
    writer.write_u8(month as u8);
    writer.write_u8(day as u8);
}

fn encode_binary_time(writer: &mut PacketWriter, micros: i64) {
    let negative = micros < 0;
    let micros = micros.unsigned_abs();

    let total_seconds = micros / 1_000_000;
    let microseconds = (micros % 1_000_000) as u32;

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let days = hours / 24;
    let hours = hours % 24;

    if days == 0 && hours == 0 && minutes == 0 && seconds == 0 && microseconds == 0 {
        writer.write_u8(0);
    } else if microseconds == 0 {
        writer.write_u8(8);
        writer.write_u8(u8::from(negative));
        writer.write_u32_le(days as u32);
        writer.write_u8(hours as u8);
        writer.write_u8(minutes as u8);
        writer.write_u8(seconds as u8);
    } else {
        writer.write_u8(12);
        writer.write_u8(u8::from(negative));
        writer.write_u32_le(days as u32);
        writer.write_u8(hours as u8);
        writer.write_u8(minutes as u8);
        writer.write_u8(seconds as u8);
        writer.write_u32_le(microseconds);
    }
}

fn encode_binary_datetime(writer: &mut PacketWriter, micros: i64) {
    let days = micros.div_euclid(MICROS_PER_DAY);
    let time_of_day = micros.rem_euclid(MICROS_PER_DAY);

    let (year, month, day) = days_to_ymd(days as i32);
    let total_seconds = time_of_day / MICROS_PER_SECOND;
    let microseconds = (time_of_day % MICROS_PER_SECOND) as u32;
    let hour = (total_seconds / 3600) as u8;
    let minute = ((total_seconds % 3600) / 60) as u8;
    let second = (total_seconds % 60) as u8;

    if hour == 0 && minute == 0 && second == 0 && microseconds == 0 {
        writer.write_u8(4);
        writer.write_u16_le(year as u16);
        writer.write_u8(month as u8);
        writer.write_u8(day as u8);
    } else if microseconds == 0 {
        writer.write_u8(7);
        writer.write_u16_le(year as u16);
        writer.write_u8(month as u8);
        writer.write_u8(day as u8);
        writer.write_u8(hour);
        writer.write_u8(minute);
        writer.write_u8(second);
    } else {
        writer.write_u8(11);
        writer.write_u16_le(year as u16);
        writer.write_u8(month as u8);
        writer.write_u8(day as u8);
        writer.write_u8(hour);
        writer.write_u8(minute);
        writer.write_u8(second);
        writer.write_u32_le(microseconds);
    }
}

/// Convert days since the Unix epoch to (year, month, day).
///
/// Uses the civil calendar algorithm from Howard Hinnant.
pub fn days_to_ymd(days: i32) -> (i32, u32, u32) {
    // 719468 days from 0000-03-01 to 1970-01-01.
    let z = days + 719_468;

    let era = if z >= 0 { z / 146_097 } else { (z - 146_096) / 146_097 };
    let doe = (z - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i32 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };

    let year = if m <= 2 { y + 1 } else { y };
    (year, m, d)
}

/// Convert a civil (year, month, day) to days since the Unix epoch.
pub fn ymd_to_days(year: i32, month: u32, day: u32) -> i32 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y / 400 } else { (y - 399) / 400 };
    let yoe = (y - era * 400) as u32;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe as i32 - 719_468
}

fn parse_text_date(s: &str) -> Option<i32> {
    let mut parts = s.splitn(3, '-');
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(ymd_to_days(year, month, day))
}

fn parse_text_time(s: &str) -> Option<i64> {
    let (s, negative) = match s.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (s, false),
    };
    let (hms, frac) = match s.split_once('.') {
        Some((a, b)) => (a, Some(b)),
        None => (s, None),
    };
    let mut parts = hms.splitn(3, ':');
    let hours = parts.next()?.parse::<i64>().ok()?;
    let minutes = parts.next()?.parse::<i64>().ok()?;
    let seconds = parts.next()?.parse::<i64>().ok()?;
    let micros = match frac {
        Some(f) => parse_fraction_micros(f)?,
        None => 0,
    };
    let total = (hours * 3600 + minutes * 60 + seconds) * MICROS_PER_SECOND + micros;
    Some(if negative { -total } else { total })
}

fn parse_text_datetime(s: &str) -> Option<i64> {
    let (date, time) = s.split_once(' ')?;
    let days = i64::from(parse_text_date(date)?);
    let time_of_day = parse_text_time(time)?;
    Some(days * MICROS_PER_DAY + time_of_day)
}

fn parse_fraction_micros(frac: &str) -> Option<i64> {
    if frac.is_empty() || frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = frac.parse::<i64>().ok()?;
    Some(value * 10_i64.pow(6 - frac.len() as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_calendar_round_trips() {
        assert_eq!(days_to_ymd(0), (1970, 1, 1));
        assert_eq!(days_to_ymd(10957), (2000, 1, 1));
        assert_eq!(days_to_ymd(19782), (2024, 2, 29));

        assert_eq!(ymd_to_days(1970, 1, 1), 0);
        assert_eq!(ymd_to_days(2000, 1, 1), 10957);
        assert_eq!(ymd_to_days(2024, 2, 29), 19782);

        for days in [-700_000, -1, 0, 1, 50_000] {
            let (y, m, d) = days_to_ymd(days);
            assert_eq!(ymd_to_days(y, m, d), days);
        }
    }

    #[test]
    fn text_decode_integers_and_null() {
        assert_eq!(
            decode_text_value(FieldType::Long, b"42", false),
            Value::Int(42)
        );
        assert_eq!(
            decode_text_value(FieldType::LongLong, b"-7", false),
            Value::BigInt(-7)
        );
        assert_eq!(decode_text_value(FieldType::Null, b"", false), Value::Null);
        assert_eq!(
            decode_text_value(FieldType::VarString, b"abc", false),
            Value::Text("abc".into())
        );
    }

    #[test]
    fn text_decode_temporals() {
        assert_eq!(
            decode_text_value(FieldType::Date, b"2000-01-01", false),
            Value::Date(10957)
        );
        assert_eq!(
            decode_text_value(FieldType::Time, b"01:02:03", false),
            Value::Time((3600 + 120 + 3) * 1_000_000)
        );
        assert_eq!(
            decode_text_value(FieldType::DateTime, b"1970-01-01 00:00:01.5", false),
            Value::Timestamp(1_500_000)
        );
        // Unparseable values fall back to text.
        assert_eq!(
            decode_text_value(FieldType::Date, b"not-a-date", false),
            Value::Text("not-a-date".into())
        );
    }

    #[test]
    fn binary_value_round_trips() {
        let values = [
            (Value::Int(42), FieldType::Long),
            (Value::BigInt(-1), FieldType::LongLong),
            (Value::Double(1.5), FieldType::Double),
            (Value::Text("hi".into()), FieldType::VarString),
            (Value::Bytes(vec![0, 1, 2]), FieldType::Blob),
            (Value::Date(19782), FieldType::Date),
            (Value::Time(-3_723_000_001), FieldType::Time),
            (Value::Timestamp(1_700_000_000_123_456), FieldType::DateTime),
        ];

        for (value, field_type) in values {
            let mut writer = PacketWriter::new();
            encode_binary_value(&mut writer, &value);
            let bytes = writer.into_bytes();
            let mut r = PacketReader::new(&bytes);
            let decoded = decode_binary_value(&mut r, field_type, false)
                .unwrap_or_else(|| panic!("decode failed for {value:?}"));
            assert_eq!(decoded, value);
            assert!(r.is_empty());
        }
    }

    #[test]
    fn binary_time_zero_is_one_byte() {
        let mut writer = PacketWriter::new();
        encode_binary_value(&mut writer, &Value::Time(0));
        assert_eq!(writer.as_bytes(), &[0]);
    }

    #[test]
    fn parameter_field_types() {
        assert_eq!(value_field_type(&Value::Null), FieldType::Null);
        assert_eq!(value_field_type(&Value::Bool(true)), FieldType::Tiny);
        assert_eq!(value_field_type(&Value::Int(1)), FieldType::Long);
        assert_eq!(value_field_type(&Value::Text(String::new())), FieldType::VarString);
        assert_eq!(value_field_type(&Value::Bytes(Vec::new())), FieldType::Blob);
        assert_eq!(value_field_type(&Value::Json(serde_json::Value::Null)), FieldType::Json);
    }
}
