use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::configurator::backend::ConfiguratorBackend;
use crate::configurator::session::ConfigurationSession;
use crate::configurator::validation::{self, ValidationFailure};
use crate::domain::attachment::{AttachmentKind, FileAttachment};
use crate::domain::dimension::DimensionPayload;
use crate::domain::ids::{LeadId, LineId, LinkedRecordId, MaterialLineId, TemplateId, ValueId, VariantId};
use crate::domain::product::ProductNode;
use crate::domain::wire;
use crate::errors::{ApplicationError, DomainError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CustomAttributeValue {
    pub ptav_id: ValueId,
    pub custom_value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkedRecordSelection {
    pub ptal_id: LineId,
    pub res_id: LinkedRecordId,
}

/// One material line to create or update on the lead.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductLinePayload {
    #[serde(serialize_with = "wire::none_as_false")]
    pub product_id: Option<VariantId>,
    pub product_template_id: TemplateId,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub ptav_ids: Vec<ValueId>,
    pub custom_attribute_values: Vec<CustomAttributeValue>,
    pub file_upload: Option<Vec<FileAttachment>>,
    pub m2o_values: Vec<LinkedRecordSelection>,
    pub conditional_file_upload: Option<Vec<FileAttachment>>,
    pub dimensions: Vec<DimensionPayload>,
    #[serde(serialize_with = "wire::none_as_false")]
    pub material_line_id: Option<MaterialLineId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmissionPayload {
    pub main_product: ProductLinePayload,
    pub optional_products: Vec<ProductLinePayload>,
    pub crm_lead_id: LeadId,
}

/// Result of a confirm request.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfirmOutcome {
    /// A selected product still holds an excluded value.
    InvalidCombination,
    Blocked(ValidationFailure),
    /// Shown once; confirming again saves anyway.
    NeedsAcknowledgement { missing: Vec<String> },
    Saved(SubmissionPayload),
}

fn non_empty(files: Vec<FileAttachment>) -> Option<Vec<FileAttachment>> {
    (!files.is_empty()).then_some(files)
}

fn product_line<B>(
    session: &ConfigurationSession<B>,
    node: &ProductNode,
    material_line_id: Option<MaterialLineId>,
) -> ProductLinePayload {
    let ptav_ids = node
        .attribute_lines
        .iter()
        .filter(|line| !line.is_file_upload())
        .flat_map(|line| line.selected_value_ids.iter().copied())
        .collect();
    let custom_attribute_values = node
        .attribute_lines
        .iter()
        .filter_map(|line| {
            let value = line.selected_custom_value()?;
            let text = line.custom_value.as_deref().filter(|text| !text.is_empty())?;
            Some(CustomAttributeValue { ptav_id: value.id, custom_value: text.to_owned() })
        })
        .collect();
    let m2o_values = session
        .product_linked_records(node.template_id)
        .into_iter()
        .map(|(ptal_id, res_id)| LinkedRecordSelection { ptal_id, res_id })
        .collect();

    ProductLinePayload {
        product_id: node.variant_id,
        product_template_id: node.template_id,
        quantity: if node.quantity > Decimal::ZERO { node.quantity } else { Decimal::ONE },
        price: node.price.max(Decimal::ZERO),
        ptav_ids,
        custom_attribute_values,
        file_upload: non_empty(session.product_attachments(AttachmentKind::FileUpload, node.template_id)),
        m2o_values,
        conditional_file_upload: non_empty(
            session.product_attachments(AttachmentKind::Conditional, node.template_id),
        ),
        dimensions: session.dimension_rows(node.template_id).iter().map(|row| row.to_payload()).collect(),
        material_line_id,
    }
}

/// Assembles the save payload from the selected products.
pub fn build_payload<B>(session: &ConfigurationSession<B>) -> Result<SubmissionPayload, DomainError> {
    let crm_lead_id = session
        .context()
        .lead_id
        .filter(|lead_id| lead_id.is_valid())
        .ok_or(DomainError::MissingLead)?;
    let main_template_id = session.main_template_id();
    let main = session
        .selected_products()
        .find(|node| node.template_id == main_template_id)
        .ok_or(DomainError::MissingMainProduct(main_template_id))?;

    Ok(SubmissionPayload {
        main_product: product_line(session, main, session.context().material_line_id),
        optional_products: session
            .selected_products()
            .filter(|node| node.template_id != main_template_id)
            .map(|node| product_line(session, node, None))
            .collect(),
        crm_lead_id,
    })
}

impl<B> ConfigurationSession<B> {
    pub fn confirm_warning_pending(&self) -> bool {
        self.confirm_warning_pending
    }

    pub fn cancel_warning(&mut self) {
        self.confirm_warning_pending = false;
    }
}

impl<B: ConfiguratorBackend> ConfigurationSession<B> {
    /// Runs the pre-save checks and saves when they pass.
    pub async fn confirm(&mut self) -> Result<ConfirmOutcome, ApplicationError> {
        if !self.is_valid_configuration() {
            return Ok(ConfirmOutcome::InvalidCombination);
        }
        if let Err(failure) = validation::validate(self) {
            return Ok(ConfirmOutcome::Blocked(failure));
        }

        let missing = validation::missing_recommended_links(self);
        if !missing.is_empty() && !self.confirm_warning_pending {
            self.confirm_warning_pending = true;
            return Ok(ConfirmOutcome::NeedsAcknowledgement { missing });
        }

        self.finalize().await.map(ConfirmOutcome::Saved)
    }

    /// Creates missing dynamic variants, then saves to the lead. A rejected
    /// save leaves the session open.
    pub async fn finalize(&mut self) -> Result<SubmissionPayload, ApplicationError> {
        self.confirm_warning_pending = false;
        if !self.context.lead_id.is_some_and(|lead_id| lead_id.is_valid()) {
            return Err(DomainError::MissingLead.into());
        }
        if !self.is_selected(self.main_template_id) {
            return Err(DomainError::MissingMainProduct(self.main_template_id).into());
        }

        let pending = self
            .selected_products()
            .filter(|node| node.needs_dynamic_variant())
            .map(|node| (node.template_id, node.combination()))
            .collect::<Vec<_>>();
        for (template_id, combination) in pending {
            let variant_id = self.backend.create_variant(template_id, &combination).await.map_err(|error| {
                warn!(
                    event_name = "configurator.session.variant_creation_failed",
                    session_id = %self.session_id,
                    template_id = %template_id,
                    error = %error,
                    "could not create dynamic variant"
                );
                ApplicationError::from(error)
            })?;
            self.node_mut(template_id)?.variant_id = Some(variant_id);
        }

        self.sync_dimensions_to_attributes();
        let payload = build_payload(self)?;
        let response = self.backend.save(&payload).await?;
        if !response.success {
            let message = response.error.unwrap_or_else(|| "Unknown error".to_owned());
            warn!(
                event_name = "configurator.session.save_rejected",
                session_id = %self.session_id,
                error = %message,
                "backend rejected the configuration"
            );
            return Err(ApplicationError::SaveRejected(message));
        }

        info!(
            event_name = "configurator.session.saved",
            session_id = %self.session_id,
            lead_id = %payload.crm_lead_id,
            optional_products = payload.optional_products.len(),
            "configuration saved to lead"
        );
        Ok(payload)
    }
}
