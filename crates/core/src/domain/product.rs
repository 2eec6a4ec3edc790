use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::attribute::{AttributeLine, AttributeRole, AttributeValue, VariantCreationMode};
use crate::domain::ids::{LineId, TemplateId, ValueId, VariantId};
use crate::domain::wire;

/// Selected value ids of one product, in attribute-line order.
pub type Combination = Vec<ValueId>;

/// Symmetric "cannot be combined with" table keyed by value id.
pub type ExclusionTable = BTreeMap<ValueId, BTreeSet<ValueId>>;

/// One product (main or optional) under configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductNode {
    #[serde(rename = "product_tmpl_id")]
    pub template_id: TemplateId,
    #[serde(default, rename = "id", deserialize_with = "wire::falsy_option")]
    pub variant_id: Option<VariantId>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "description_sale", deserialize_with = "wire::falsy_option")]
    pub description: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    #[serde(default, deserialize_with = "wire::falsy_or_default")]
    pub price: Decimal,
    #[serde(default)]
    pub attribute_lines: Vec<AttributeLine>,
    #[serde(default)]
    pub exclusions: ExclusionTable,
    #[serde(default)]
    pub parent_exclusions: ExclusionTable,
    #[serde(default)]
    pub archived_combinations: Vec<Combination>,
    #[serde(default, rename = "parent_product_tmpl_ids")]
    pub parent_template_ids: BTreeSet<TemplateId>,
}

fn default_quantity() -> Decimal {
    Decimal::ONE
}

impl ProductNode {
    pub fn new(template_id: TemplateId, display_name: impl Into<String>) -> Self {
        Self {
            template_id,
            variant_id: None,
            display_name: display_name.into(),
            description: None,
            quantity: Decimal::ONE,
            price: Decimal::ZERO,
            attribute_lines: Vec::new(),
            exclusions: ExclusionTable::new(),
            parent_exclusions: ExclusionTable::new(),
            archived_combinations: Vec::new(),
            parent_template_ids: BTreeSet::new(),
        }
    }

    pub fn combination(&self) -> Combination {
        self.attribute_lines
            .iter()
            .flat_map(|line| line.selected_value_ids.iter().copied())
            .collect()
    }

    pub fn line(&self, line_id: LineId) -> Option<&AttributeLine> {
        self.attribute_lines.iter().find(|line| line.id == line_id)
    }

    pub fn line_mut(&mut self, line_id: LineId) -> Option<&mut AttributeLine> {
        self.attribute_lines.iter_mut().find(|line| line.id == line_id)
    }

    pub fn line_by_role(&self, role: AttributeRole) -> Option<&AttributeLine> {
        self.attribute_lines.iter().find(|line| line.role() == role)
    }

    pub fn line_by_role_mut(&mut self, role: AttributeRole) -> Option<&mut AttributeLine> {
        self.attribute_lines.iter_mut().find(|line| line.role() == role)
    }

    pub fn value(&self, value_id: ValueId) -> Option<&AttributeValue> {
        self.attribute_lines.iter().find_map(|line| line.value(value_id))
    }

    pub fn value_mut(&mut self, value_id: ValueId) -> Option<&mut AttributeValue> {
        self.attribute_lines.iter_mut().find_map(|line| line.value_mut(value_id))
    }

    /// True iff no line carries a selected value that is currently excluded.
    pub fn is_valid_combination(&self) -> bool {
        !self.attribute_lines.iter().any(AttributeLine::has_excluded_selection)
    }

    /// A fixed-variant product: every line always produces variants, so a
    /// missing variant id means the combination no longer exists.
    pub fn all_lines_always(&self) -> bool {
        self.attribute_lines
            .iter()
            .all(|line| line.variant_creation_mode == VariantCreationMode::Always)
    }

    pub fn needs_dynamic_variant(&self) -> bool {
        self.variant_id.is_none()
            && self
                .attribute_lines
                .iter()
                .any(|line| line.variant_creation_mode == VariantCreationMode::Dynamic)
    }

    pub fn has_dimensions(&self) -> bool {
        self.line_by_role(AttributeRole::Length).is_some()
            && self.line_by_role(AttributeRole::Width).is_some()
    }

    pub fn is_optional(&self) -> bool {
        !self.parent_template_ids.is_empty()
    }

    pub fn normalize(&mut self) {
        for line in &mut self.attribute_lines {
            line.normalize();
        }
    }
}
