use serde::Serialize;

use crate::configurator::session::ConfigurationSession;
use crate::configurator::visibility::is_gelcoat_required;
use crate::domain::attachment::AttachmentKind;
use crate::domain::attribute::{AttributeLine, AttributeRole};
use crate::domain::product::ProductNode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    MissingRequiredFile,
    GelcoatRequired,
}

/// A hard check that blocks submission until the user fixes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub code: ValidationCode,
    pub title: String,
    pub message: String,
}

/// Every selected value flagged `required_file` needs a conditional upload
/// on its line.
pub fn check_conditional_files<B>(session: &ConfigurationSession<B>) -> Result<(), ValidationFailure> {
    for node in session.selected_products() {
        for line in &node.attribute_lines {
            let requires_file = line.selected_values().any(|value| value.required_file);
            if requires_file
                && session.attachments(AttachmentKind::Conditional, node.template_id, line.id).is_empty()
            {
                return Err(ValidationFailure {
                    code: ValidationCode::MissingRequiredFile,
                    title: "Missing Required File".to_owned(),
                    message: format!("Please upload a file for {}.", line.attribute.name),
                });
            }
        }
    }
    Ok(())
}

fn has_gelcoat_selection<B>(
    session: &ConfigurationSession<B>,
    node: &ProductNode,
    line: &AttributeLine,
) -> bool {
    if line.is_linked_record() {
        return session.linked_record(node.template_id, line.id).is_some()
            || line
                .selected_values()
                .any(|value| value.linked_record_id.is_some_and(|record_id| record_id.is_valid()));
    }
    line.selected_values().any(|value| {
        let name = value.name.trim();
        !name.is_empty() && !name.to_lowercase().contains("select")
    })
}

/// With gel-coat requested on the main product, every line flagged as
/// gel-coat dependent needs a real choice.
pub fn check_gelcoat_requirement<B>(session: &ConfigurationSession<B>) -> Result<(), ValidationFailure> {
    let Ok(main) = session.main_product() else {
        return Ok(());
    };
    if !is_gelcoat_required(main) {
        return Ok(());
    }
    let requirement_name = main
        .line_by_role(AttributeRole::GelcoatRequirement)
        .map(|line| line.attribute.name.as_str())
        .unwrap_or("Gel Coat REQ");

    let missing = main.attribute_lines.iter().find(|line| {
        line.attribute.is_gelcoat_required_flag
            && line.role() != AttributeRole::GelcoatRequirement
            && !has_gelcoat_selection(session, main, line)
    });
    match missing {
        Some(_) => Err(ValidationFailure {
            code: ValidationCode::GelcoatRequired,
            title: "Gel-coat Required".to_owned(),
            message: format!(
                "Gel-coat selection is required when \"{requirement_name}\" is set to \"Yes\". \
                 Please select a Gel-coat option."
            ),
        }),
        None => Ok(()),
    }
}

/// Linked-record choices on the main product worth a second look before
/// saving. An empty list means no confirmation is needed.
pub fn missing_recommended_links<B>(session: &ConfigurationSession<B>) -> Vec<String> {
    let Ok(main) = session.main_product() else {
        return Vec::new();
    };
    let gelcoat_required = is_gelcoat_required(main);

    main.attribute_lines
        .iter()
        .filter(|line| line.is_linked_record())
        .filter(|line| match line.role() {
            AttributeRole::GelcoatRequirement
            | AttributeRole::GelcoatColor
            | AttributeRole::ResinColor => false,
            AttributeRole::Gelcoat => gelcoat_required,
            _ => true,
        })
        .filter(|line| {
            !session.linked_record(main.template_id, line.id).is_some_and(|record_id| record_id.is_valid())
        })
        .map(|line| line.attribute.name.clone())
        .collect()
}

/// Hard checks in submission order.
pub fn validate<B>(session: &ConfigurationSession<B>) -> Result<(), ValidationFailure> {
    check_conditional_files(session)?;
    check_gelcoat_requirement(session)
}
