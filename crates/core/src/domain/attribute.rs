use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ids::{AttributeId, LineId, LinkedRecordId, ValueId};
use crate::domain::wire;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    Color,
    Multi,
    Pills,
    Radio,
    Select,
    FileUpload,
    #[serde(rename = "m2o")]
    LinkedRecord,
    StrictlyNumeric,
}

impl DisplayKind {
    pub fn allows_multiple(self) -> bool {
        matches!(self, Self::Multi)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantCreationMode {
    #[default]
    Always,
    Dynamic,
    NoVariant,
}

/// Business meaning of an attribute, driving cross-attribute visibility,
/// pairing and validation rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeRole {
    #[default]
    Plain,
    GelcoatRequirement,
    Gelcoat,
    GelcoatColor,
    Resin,
    ResinColor,
    SheetType,
    ColorPigment,
    Length,
    Width,
    LengthUom,
    WidthUom,
    QuantityUom,
    Thickness,
}

impl AttributeRole {
    /// Derives a role from a display name, for backends that predate typed roles.
    pub fn infer(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        if name.contains("gel coat req") || name.contains("gelcoat req") {
            return Self::GelcoatRequirement;
        }

        match name.as_str() {
            "gelcoat color" | "gel coat color" | "gel-coat color" => Self::GelcoatColor,
            "resin color" | "resin colour" | "raisin color" | "raisign color" => Self::ResinColor,
            "gelcoat" | "gel coat" | "gel-coat" => Self::Gelcoat,
            "resin type" | "raisin type" | "rasign type" | "raisign type" | "resin" | "raisin"
            | "rasign" => Self::Resin,
            "type of frp sheet" => Self::SheetType,
            "length" => Self::Length,
            "width" => Self::Width,
            "thickness" => Self::Thickness,
            _ if name.contains("color") && (name.contains("pigment") || name.contains("pintpant")) => {
                Self::ColorPigment
            }
            _ if name.contains("length uom") => Self::LengthUom,
            _ if name.contains("width uom") => Self::WidthUom,
            _ if name.contains("quantity uom") || name.contains("qty uom") => Self::QuantityUom,
            _ => Self::Plain,
        }
    }

    pub fn is_dimension(self) -> bool {
        matches!(self, Self::Length | Self::Width | Self::LengthUom | Self::WidthUom)
    }
}

/// Option of a linked-record attribute as offered by the backend dropdown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRecordOption {
    pub id: LinkedRecordId,
    #[serde(default, alias = "display_name")]
    pub name: String,
    #[serde(default)]
    pub is_opaque: bool,
    #[serde(default)]
    pub is_translucent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    #[serde(rename = "display_type")]
    pub display_kind: DisplayKind,
    #[serde(default, rename = "is_quantity")]
    pub is_quantity_attribute: bool,
    #[serde(default)]
    pub is_width_check: bool,
    #[serde(default)]
    pub pair_with_previous: bool,
    #[serde(default)]
    pub is_gelcoat_required_flag: bool,
    #[serde(
        default,
        rename = "m2o_model_technical_name",
        deserialize_with = "wire::falsy_option"
    )]
    pub linked_model: Option<String>,
    #[serde(default, rename = "m2o_values")]
    pub linked_options: Vec<LinkedRecordOption>,
    #[serde(default)]
    pub role: AttributeRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: ValueId,
    pub name: String,
    #[serde(default)]
    pub is_custom: bool,
    /// Recomputed on every exclusion pass; never persisted.
    #[serde(skip)]
    pub excluded: bool,
    #[serde(default, deserialize_with = "wire::falsy_option")]
    pub html_color: Option<String>,
    #[serde(default, deserialize_with = "wire::falsy_option")]
    pub image: Option<String>,
    #[serde(default, rename = "m2o_res_id", deserialize_with = "wire::record_reference")]
    pub linked_record_id: Option<LinkedRecordId>,
    #[serde(default)]
    pub required_file: bool,
    #[serde(default)]
    pub is_opaque: bool,
    #[serde(default)]
    pub is_translucent: bool,
    /// The "yes" option of a boolean-valued attribute.
    #[serde(default)]
    pub affirmative: bool,
}

impl AttributeValue {
    /// Name without the backend's ` (+price)` suffix.
    pub fn display_name(&self) -> &str {
        self.name.split(" (").next().unwrap_or_default().trim()
    }

    pub fn numeric_value(&self) -> Option<Decimal> {
        parse_number(self.display_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeLine {
    pub id: LineId,
    pub attribute: Attribute,
    #[serde(rename = "attribute_values")]
    pub values: Vec<AttributeValue>,
    #[serde(default, rename = "selected_attribute_value_ids")]
    pub selected_value_ids: Vec<ValueId>,
    #[serde(default, alias = "customValue", deserialize_with = "wire::falsy_option")]
    pub custom_value: Option<String>,
    #[serde(default, rename = "create_variant")]
    pub variant_creation_mode: VariantCreationMode,
}

impl AttributeLine {
    pub fn value(&self, value_id: ValueId) -> Option<&AttributeValue> {
        self.values.iter().find(|value| value.id == value_id)
    }

    pub fn value_mut(&mut self, value_id: ValueId) -> Option<&mut AttributeValue> {
        self.values.iter_mut().find(|value| value.id == value_id)
    }

    pub fn is_selected(&self, value_id: ValueId) -> bool {
        self.selected_value_ids.contains(&value_id)
    }

    /// Selected values in selection order.
    pub fn selected_values(&self) -> impl Iterator<Item = &AttributeValue> + '_ {
        self.selected_value_ids.iter().filter_map(|value_id| self.value(*value_id))
    }

    pub fn first_selected(&self) -> Option<&AttributeValue> {
        self.selected_values().next()
    }

    pub fn first_selected_mut(&mut self) -> Option<&mut AttributeValue> {
        let value_id = *self.selected_value_ids.first()?;
        self.value_mut(value_id)
    }

    pub fn selected_custom_value(&self) -> Option<&AttributeValue> {
        self.selected_values().find(|value| value.is_custom)
    }

    pub fn custom_value_slot(&self) -> Option<&AttributeValue> {
        self.values.iter().find(|value| value.is_custom)
    }

    pub fn is_file_upload(&self) -> bool {
        self.attribute.display_kind == DisplayKind::FileUpload
    }

    pub fn is_linked_record(&self) -> bool {
        self.attribute.display_kind == DisplayKind::LinkedRecord
    }

    pub fn role(&self) -> AttributeRole {
        self.attribute.role
    }

    /// Toggles `value_id` on multi-select lines, replaces the selection otherwise.
    pub fn select(&mut self, value_id: ValueId, multi_value_allowed: bool) -> Result<(), DomainError> {
        if self.value(value_id).is_none() {
            return Err(DomainError::UnknownValue { line_id: self.id, value_id });
        }

        if multi_value_allowed && self.attribute.display_kind.allows_multiple() {
            if self.is_selected(value_id) {
                self.selected_value_ids.retain(|selected| *selected != value_id);
            } else {
                self.selected_value_ids.push(value_id);
            }
        } else {
            self.selected_value_ids = vec![value_id];
        }
        Ok(())
    }

    pub fn clear_exclusions(&mut self) {
        for value in &mut self.values {
            value.excluded = false;
        }
    }

    pub fn has_excluded_selection(&self) -> bool {
        self.selected_values().any(|value| value.excluded)
    }

    /// Fills typed roles and value flags that the backend left unset.
    pub fn normalize(&mut self) {
        if self.attribute.role == AttributeRole::Plain {
            self.attribute.role = AttributeRole::infer(&self.attribute.name);
        }
        let known_ids = self.values.iter().map(|value| value.id).collect::<Vec<_>>();
        self.selected_value_ids.retain(|value_id| known_ids.contains(value_id));
        if !self.attribute.display_kind.allows_multiple() {
            self.selected_value_ids.truncate(1);
        }

        let sheet_type = self.attribute.role == AttributeRole::SheetType;
        for value in &mut self.values {
            let name = value.display_name().to_lowercase();
            if name == "yes" {
                value.affirmative = true;
            }
            if sheet_type && !value.is_opaque && !value.is_translucent {
                value.is_opaque = name == "opaque";
                value.is_translucent = name == "translucent";
            }
        }
    }
}

/// Reads the leading number of a free-text entry, so `"7.5"` and `"5 pcs"`
/// both yield a quantity.
pub fn parse_number(text: &str) -> Option<Decimal> {
    let text = text.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (index, ch) in text.char_indices() {
        match ch {
            '-' | '+' if index == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = index + ch.len_utf8();
    }
    if !seen_digit {
        return None;
    }
    text[..end].trim_end_matches('.').parse::<Decimal>().ok()
}
