//! Cross-attribute display rules for FRP sheet products.

use crate::configurator::session::ConfigurationSession;
use crate::domain::attribute::{AttributeLine, AttributeRole, AttributeValue, LinkedRecordOption};
use crate::domain::ids::TemplateId;
use crate::domain::product::ProductNode;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SheetKind {
    Opaque,
    Translucent,
}

pub fn sheet_kind(node: &ProductNode) -> Option<SheetKind> {
    let value = node.line_by_role(AttributeRole::SheetType)?.first_selected()?;
    if value.is_opaque {
        Some(SheetKind::Opaque)
    } else if value.is_translucent {
        Some(SheetKind::Translucent)
    } else {
        None
    }
}

/// `None` when there is no requirement line or nothing is picked on it.
pub fn gelcoat_requirement(node: &ProductNode) -> Option<bool> {
    let line = node.line_by_role(AttributeRole::GelcoatRequirement)?;
    line.first_selected().map(|value| value.affirmative)
}

pub fn is_gelcoat_required(node: &ProductNode) -> bool {
    gelcoat_requirement(node) == Some(true)
}

pub fn is_line_visible(node: &ProductNode, line: &AttributeLine, dimension_rows_active: bool) -> bool {
    match line.role() {
        AttributeRole::Gelcoat => {
            node.line_by_role(AttributeRole::GelcoatRequirement).is_none() || is_gelcoat_required(node)
        }
        role if role.is_dimension() => !dimension_rows_active,
        AttributeRole::ColorPigment => sheet_kind(node) != Some(SheetKind::Translucent),
        // Shown next to their resin / gel-coat line instead.
        AttributeRole::ResinColor | AttributeRole::GelcoatColor => false,
        _ => true,
    }
}

/// The color line rendered beside a resin or gel-coat line.
pub fn paired_line<'a>(node: &'a ProductNode, line: &AttributeLine) -> Option<&'a AttributeLine> {
    match line.role() {
        AttributeRole::Resin => node.line_by_role(AttributeRole::ResinColor),
        AttributeRole::Gelcoat if gelcoat_requirement(node) != Some(false) => {
            node.line_by_role(AttributeRole::GelcoatColor)
        }
        _ => None,
    }
}

fn matches_sheet(kind: Option<SheetKind>, is_opaque: bool, is_translucent: bool) -> bool {
    match kind {
        Some(SheetKind::Opaque) => is_opaque,
        Some(SheetKind::Translucent) => is_translucent,
        None => true,
    }
}

fn filters_by_sheet(line: &AttributeLine) -> bool {
    matches!(line.role(), AttributeRole::Resin | AttributeRole::Gelcoat)
}

/// Values offered on `line`; resin and gel-coat follow the sheet type.
pub fn visible_values<'a>(node: &ProductNode, line: &'a AttributeLine) -> Vec<&'a AttributeValue> {
    let kind = if filters_by_sheet(line) { sheet_kind(node) } else { None };
    line.values
        .iter()
        .filter(|value| matches_sheet(kind, value.is_opaque, value.is_translucent))
        .collect()
}

pub fn visible_linked_options<'a>(
    node: &ProductNode,
    line: &'a AttributeLine,
) -> Vec<&'a LinkedRecordOption> {
    let kind = if filters_by_sheet(line) { sheet_kind(node) } else { None };
    line.attribute
        .linked_options
        .iter()
        .filter(|option| matches_sheet(kind, option.is_opaque, option.is_translucent))
        .collect()
}

impl<B> ConfigurationSession<B> {
    /// Lines of a product in display order, after the visibility rules.
    pub fn visible_lines(&self, template_id: TemplateId) -> Result<Vec<&AttributeLine>, DomainError> {
        let node = self.node(template_id)?;
        let dimension_rows_active =
            self.dimension_rows.get(&template_id).is_some_and(|rows| !rows.is_empty());
        Ok(node
            .attribute_lines
            .iter()
            .filter(|line| is_line_visible(node, line, dimension_rows_active))
            .collect())
    }
}
