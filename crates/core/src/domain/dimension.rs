use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::attribute::parse_number;
use crate::domain::ids::ValueId;
use crate::domain::wire;

pub const NUMERIC_ONLY_WARNING: &str = "Numeric Values Only !";

/// One measured piece: length x width, repeated `qty` times.
///
/// Numeric fields keep the user's text so a blank entry stays blank until
/// submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
    pub length: String,
    pub width: String,
    pub qty: String,
    #[serde(rename = "lUomId", default, deserialize_with = "wire::falsy_option")]
    pub length_uom: Option<ValueId>,
    #[serde(rename = "wUomId", default, deserialize_with = "wire::falsy_option")]
    pub width_uom: Option<ValueId>,
    #[serde(rename = "qUomId", default, deserialize_with = "wire::falsy_option")]
    pub qty_uom: Option<ValueId>,
}

impl DimensionRow {
    pub fn blank(
        length_uom: Option<ValueId>,
        width_uom: Option<ValueId>,
        qty_uom: Option<ValueId>,
    ) -> Self {
        Self {
            length: String::new(),
            width: String::new(),
            qty: "1".to_owned(),
            length_uom,
            width_uom,
            qty_uom,
        }
    }

    /// Next row after `self`: same width and units, fresh length.
    pub fn follow_up(&self) -> Self {
        Self {
            length: String::new(),
            width: self.width.clone(),
            qty: "1".to_owned(),
            length_uom: self.length_uom,
            width_uom: self.width_uom,
            qty_uom: self.qty_uom,
        }
    }

    /// Applies one field edit. Numeric edits are sanitized; the returned
    /// warning is set when the raw input had to be cleaned.
    pub fn apply(&mut self, update: DimensionUpdate) -> Option<&'static str> {
        let (slot, raw) = match update {
            DimensionUpdate::Length(raw) => (&mut self.length, raw),
            DimensionUpdate::Width(raw) => (&mut self.width, raw),
            DimensionUpdate::Quantity(raw) => (&mut self.qty, raw),
            DimensionUpdate::Uom(DimensionAxis::Length, value_id) => {
                self.length_uom = Some(value_id);
                return None;
            }
            DimensionUpdate::Uom(DimensionAxis::Width, value_id) => {
                self.width_uom = Some(value_id);
                return None;
            }
            DimensionUpdate::Uom(DimensionAxis::Quantity, value_id) => {
                self.qty_uom = Some(value_id);
                return None;
            }
        };
        let sanitized = sanitize_numeric(&raw);
        *slot = sanitized.value;
        sanitized.rejected.then_some(NUMERIC_ONLY_WARNING)
    }

    /// Submission shape: blank or unreadable sizes become 0, quantity 1.
    pub fn to_payload(&self) -> DimensionPayload {
        DimensionPayload {
            length: parse_number(&self.length).unwrap_or(Decimal::ZERO),
            width: parse_number(&self.width).unwrap_or(Decimal::ZERO),
            qty: parse_number(&self.qty).unwrap_or(Decimal::ONE),
            length_uom: self.length_uom,
            width_uom: self.width_uom,
            qty_uom: self.qty_uom,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionAxis {
    Length,
    Width,
    Quantity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DimensionUpdate {
    Length(String),
    Width(String),
    Quantity(String),
    Uom(DimensionAxis, ValueId),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DimensionPayload {
    #[serde(with = "rust_decimal::serde::float")]
    pub length: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub width: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub qty: Decimal,
    #[serde(rename = "lUomId", serialize_with = "wire::none_as_false")]
    pub length_uom: Option<ValueId>,
    #[serde(rename = "wUomId", serialize_with = "wire::none_as_false")]
    pub width_uom: Option<ValueId>,
    #[serde(rename = "qUomId", serialize_with = "wire::none_as_false")]
    pub qty_uom: Option<ValueId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedNumber {
    pub value: String,
    /// The input contained something other than digits and a single dot.
    pub rejected: bool,
}

/// Keeps digits and the first dot, with at most two decimals.
pub fn sanitize_numeric(raw: &str) -> SanitizedNumber {
    let mut dots = 0;
    let rejected = !raw.chars().all(|ch| {
        if ch == '.' {
            dots += 1;
            dots <= 1
        } else {
            ch.is_ascii_digit()
        }
    });

    let digits_and_dots = raw.chars().filter(|ch| ch.is_ascii_digit() || *ch == '.').collect::<String>();
    let mut parts = digits_and_dots.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let value = match parts.next() {
        Some(fraction) => {
            let fraction = fraction.chars().filter(char::is_ascii_digit).take(2).collect::<String>();
            format!("{whole}.{fraction}")
        }
        None => whole.to_owned(),
    };

    SanitizedNumber { value, rejected }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        sanitize_numeric, DimensionAxis, DimensionRow, DimensionUpdate, NUMERIC_ONLY_WARNING,
    };
    use crate::domain::ids::ValueId;

    #[test]
    fn sanitize_keeps_one_dot_and_two_decimals() {
        let cleaned = sanitize_numeric("12.3456");
        assert_eq!(cleaned.value, "12.34");
        assert!(!cleaned.rejected);

        let cleaned = sanitize_numeric("1.2.3");
        assert_eq!(cleaned.value, "1.23");
        assert!(cleaned.rejected);

        let cleaned = sanitize_numeric("4a5 mm");
        assert_eq!(cleaned.value, "45");
        assert!(cleaned.rejected);

        assert_eq!(sanitize_numeric("").value, "");
        assert_eq!(sanitize_numeric("7.").value, "7.");
    }

    #[test]
    fn follow_up_row_copies_width_and_units() {
        let mut first = DimensionRow::blank(Some(ValueId(1)), Some(ValueId(2)), None);
        first.length = "300".to_owned();
        first.width = "120".to_owned();

        let next = first.follow_up();

        assert_eq!(next.length, "");
        assert_eq!(next.width, "120");
        assert_eq!(next.qty, "1");
        assert_eq!(next.length_uom, Some(ValueId(1)));
        assert_eq!(next.width_uom, Some(ValueId(2)));
    }

    #[test]
    fn numeric_updates_are_sanitized_with_warning() {
        let mut row = DimensionRow::blank(None, None, None);

        assert_eq!(row.apply(DimensionUpdate::Length("25x".to_owned())), Some(NUMERIC_ONLY_WARNING));
        assert_eq!(row.length, "25");
        assert_eq!(row.apply(DimensionUpdate::Width("10.5".to_owned())), None);
        assert_eq!(row.apply(DimensionUpdate::Uom(DimensionAxis::Quantity, ValueId(9))), None);
        assert_eq!(row.qty_uom, Some(ValueId(9)));
    }

    #[test]
    fn payload_fills_blank_numbers() {
        let mut row = DimensionRow::blank(Some(ValueId(4)), None, None);
        row.qty = String::new();
        row.width = "80.25".to_owned();

        let payload = row.to_payload();

        assert_eq!(payload.length, Decimal::ZERO);
        assert_eq!(payload.width, Decimal::new(8025, 2));
        assert_eq!(payload.qty, Decimal::ONE);

        let json = serde_json::to_value(&payload).expect("serialize payload");
        assert_eq!(json["lUomId"], serde_json::json!(4));
        assert_eq!(json["wUomId"], serde_json::json!(false));
        assert_eq!(json["length"], serde_json::json!(0.0));
    }
}
