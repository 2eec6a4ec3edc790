use tracing::debug;

use crate::configurator::session::ConfigurationSession;
use crate::domain::attribute::{parse_number, AttributeRole, AttributeValue};
use crate::domain::dimension::{DimensionAxis, DimensionRow, DimensionUpdate};
use crate::domain::ids::{TemplateId, ValueId};
use crate::domain::product::ProductNode;
use crate::errors::DomainError;

fn uom_role(axis: DimensionAxis) -> AttributeRole {
    match axis {
        DimensionAxis::Length => AttributeRole::LengthUom,
        DimensionAxis::Width => AttributeRole::WidthUom,
        DimensionAxis::Quantity => AttributeRole::QuantityUom,
    }
}

/// Unit picked on the product, or its first unit.
fn default_uom(node: &ProductNode, axis: DimensionAxis) -> Option<ValueId> {
    let line = node.line_by_role(uom_role(axis))?;
    line.selected_value_ids.first().copied().or_else(|| line.values.first().map(|value| value.id))
}

fn first_row_for(node: &ProductNode) -> DimensionRow {
    DimensionRow::blank(
        default_uom(node, DimensionAxis::Length),
        default_uom(node, DimensionAxis::Width),
        default_uom(node, DimensionAxis::Quantity),
    )
}

impl<B> ConfigurationSession<B> {
    /// Gives every product with both a length and a width attribute its
    /// first dimension row.
    pub(super) fn init_dimension_rows(&mut self) {
        for node in self.nodes.values().filter(|node| node.has_dimensions()) {
            self.dimension_rows
                .entry(node.template_id)
                .or_insert_with(|| vec![first_row_for(node)]);
        }
    }

    pub fn dimension_rows(&self, template_id: TemplateId) -> &[DimensionRow] {
        self.dimension_rows.get(&template_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Appends a row and returns its index.
    pub fn add_dimension_row(&mut self, template_id: TemplateId) -> Result<usize, DomainError> {
        let node = self.node(template_id)?;
        let fresh = first_row_for(node);
        let rows = self.dimension_rows.entry(template_id).or_default();
        let row = rows.last().map_or(fresh, DimensionRow::follow_up);
        rows.push(row);
        Ok(rows.len() - 1)
    }

    /// Removes a row; a product keeps at least one.
    pub fn remove_dimension_row(&mut self, template_id: TemplateId, index: usize) -> Result<(), DomainError> {
        self.node(template_id)?;
        let Some(rows) = self.dimension_rows.get_mut(&template_id) else {
            return Ok(());
        };
        if index < rows.len() {
            rows.remove(index);
        }
        if rows.is_empty() {
            self.add_dimension_row(template_id)?;
        }
        Ok(())
    }

    /// Edits one field of a row. Returns the warning to show next to the
    /// field when numeric input had to be cleaned.
    pub fn update_dimension_row(
        &mut self,
        template_id: TemplateId,
        index: usize,
        update: DimensionUpdate,
    ) -> Result<Option<&'static str>, DomainError> {
        self.node(template_id)?;
        let row = self
            .dimension_rows
            .get_mut(&template_id)
            .and_then(|rows| rows.get_mut(index))
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "dimension row {index} does not exist on product template {template_id}"
                ))
            })?;
        Ok(row.apply(update))
    }

    pub fn uom_options(
        &self,
        template_id: TemplateId,
        axis: DimensionAxis,
    ) -> Result<&[AttributeValue], DomainError> {
        let node = self.node(template_id)?;
        Ok(node.line_by_role(uom_role(axis)).map(|line| line.values.as_slice()).unwrap_or_default())
    }

    /// Copies a width read from a linked record into the width attribute and
    /// the first dimension row.
    pub fn auto_fill_width(&mut self, template_id: TemplateId, width: &str) -> Result<(), DomainError> {
        let node = self.node_mut(template_id)?;
        let Some(line) = node.line_by_role_mut(AttributeRole::Width) else {
            return Ok(());
        };
        if let Some(custom_id) = line.custom_value_slot().map(|value| value.id) {
            line.selected_value_ids = vec![custom_id];
        }
        line.custom_value = Some(width.to_owned());

        if let Some(first) = self.dimension_rows.get_mut(&template_id).and_then(|rows| rows.first_mut()) {
            first.width = if width.trim().is_empty() {
                String::new()
            } else {
                parse_number(width).map(|number| number.to_string()).unwrap_or_else(|| "0".to_owned())
            };
        }
        debug!(
            event_name = "configurator.session.width_auto_filled",
            template_id = %template_id,
            "width copied from linked record"
        );
        Ok(())
    }

    /// Writes the first dimension row of every product into its length,
    /// width and unit attributes.
    pub fn sync_dimensions_to_attributes(&mut self) {
        for (template_id, rows) in &self.dimension_rows {
            let (Some(first), Some(node)) = (rows.first(), self.nodes.get_mut(template_id)) else {
                continue;
            };
            for line in &mut node.attribute_lines {
                match line.role() {
                    AttributeRole::Length => line.custom_value = Some(first.length.clone()),
                    AttributeRole::Width => line.custom_value = Some(first.width.clone()),
                    AttributeRole::LengthUom => {
                        if let Some(uom) = first.length_uom {
                            line.selected_value_ids = vec![uom];
                        }
                    }
                    AttributeRole::WidthUom => {
                        if let Some(uom) = first.width_uom {
                            line.selected_value_ids = vec![uom];
                        }
                    }
                    AttributeRole::QuantityUom => {
                        if let Some(uom) = first.qty_uom {
                            line.selected_value_ids = vec![uom];
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}
