//! Cell model and BSON value rendering
//!
//! A cell distinguishes three cases a flat string cannot:
//! - the field is absent from the document ([`Cell::Missing`], written as `NULL`)
//! - the field holds BSON null ([`Cell::Null`], written as an empty cell)
//! - the field holds a value ([`Cell::Text`])
//!
//! Embedded documents and arrays are rendered as compact relaxed Extended JSON.

use mongodb::bson::{Bson, DateTime};

/// Written for a column the document does not have
pub const MISSING_SENTINEL: &str = "NULL";

/// Largest cell a spreadsheet accepts, in characters
pub const MAX_CELL_CHARS: usize = 50_000;

/// One cell of an export row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Missing,
    Null,
    Text(String),
}

impl Cell {
    /// Build the cell for a field lookup result
    pub fn from_field(value: Option<&Bson>) -> Self {
        match value {
            None => Cell::Missing,
            Some(Bson::Null) | Some(Bson::Undefined) => Cell::Null,
            Some(other) => Cell::Text(render_bson(other)),
        }
    }

    /// Text written to the output
    pub fn as_str(&self) -> &str {
        match self {
            Cell::Missing => MISSING_SENTINEL,
            Cell::Null => "",
            Cell::Text(s) => s,
        }
    }

    /// Why this cell cannot be written, if it cannot
    pub fn representation_problem(&self) -> Option<String> {
        let Cell::Text(text) = self else {
            return None;
        };
        if text.contains('\0') {
            return Some("value contains a NUL character".to_string());
        }
        let chars = text.chars().count();
        if chars > MAX_CELL_CHARS {
            return Some(format!(
                "value has {chars} characters, more than the {MAX_CELL_CHARS} a cell holds"
            ));
        }
        None
    }
}

/// Render a non-null BSON value as plain text
pub fn render_bson(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(f) => f.to_string(),
        Bson::Boolean(b) => b.to_string(),
        Bson::Null | Bson::Undefined => String::new(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(dt) => datetime_to_iso_string(dt),
        Bson::Decimal128(d) => d.to_string(),
        Bson::Binary(bin) => hex::encode(&bin.bytes),
        Bson::RegularExpression(regex) => format!("/{}/{}", regex.pattern, regex.options),
        Bson::Timestamp(ts) => format!("Timestamp({}, {})", ts.time, ts.increment),
        Bson::Document(_) | Bson::Array(_) => value.clone().into_relaxed_extjson().to_string(),
        Bson::MinKey => String::from("MinKey"),
        Bson::MaxKey => String::from("MaxKey"),
        other => other.to_string(),
    }
}

/// RFC 3339 form, or epoch milliseconds when out of range
fn datetime_to_iso_string(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| dt.timestamp_millis().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{Binary, doc, oid::ObjectId, spec::BinarySubtype};

    #[test]
    fn test_missing_null_and_empty_are_distinct() {
        assert_eq!(Cell::from_field(None), Cell::Missing);
        assert_eq!(Cell::from_field(Some(&Bson::Null)), Cell::Null);
        assert_eq!(
            Cell::from_field(Some(&Bson::String(String::new()))),
            Cell::Text(String::new())
        );

        assert_eq!(Cell::Missing.as_str(), "NULL");
        assert_eq!(Cell::Null.as_str(), "");
    }

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(render_bson(&Bson::String("A".into())), "A");
        assert_eq!(render_bson(&Bson::Int32(42)), "42");
        assert_eq!(render_bson(&Bson::Int64(-7)), "-7");
        assert_eq!(render_bson(&Bson::Double(2.5)), "2.5");
        assert_eq!(render_bson(&Bson::Boolean(false)), "false");

        let oid = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(render_bson(&Bson::ObjectId(oid)), "507f1f77bcf86cd799439011");

        let dt = DateTime::from_millis(0);
        assert_eq!(render_bson(&Bson::DateTime(dt)), "1970-01-01T00:00:00Z");

        let bin = Binary {
            subtype: BinarySubtype::Generic,
            bytes: vec![0xde, 0xad],
        };
        assert_eq!(render_bson(&Bson::Binary(bin)), "dead");
    }

    #[test]
    fn test_nested_values_render_as_json() {
        let nested = Bson::Document(doc! { "city": "Oslo", "zip": 150 });
        assert_eq!(render_bson(&nested), r#"{"city":"Oslo","zip":150}"#);

        let array = Bson::Array(vec![Bson::Int32(1), Bson::String("x".into())]);
        assert_eq!(render_bson(&array), r#"[1,"x"]"#);
    }

    #[test]
    fn test_representation_problems() {
        assert!(Cell::Missing.representation_problem().is_none());
        assert!(Cell::Text("fine".into()).representation_problem().is_none());
        assert!(
            Cell::Text("nul\0byte".into())
                .representation_problem()
                .is_some()
        );
        assert!(
            Cell::Text("x".repeat(MAX_CELL_CHARS + 1))
                .representation_problem()
                .is_some()
        );
        assert!(
            Cell::Text("x".repeat(MAX_CELL_CHARS))
                .representation_problem()
                .is_none()
        );
    }
}
