use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::configurator::backend::{
    CombinationRequest, CombinationUpdate, ConfiguratorBackend, LoadRequest, LoadResponse,
    OptionalProductsRequest,
};
use crate::configurator::exclusions::{child_ids, parent_combination, resolve_from};
use crate::configurator::pricing::{merge_update, PricingSequencer, PricingTicket};
use crate::domain::attachment::{AttachmentKind, FileAttachment};
use crate::domain::attribute::{parse_number, AttributeRole};
use crate::domain::dimension::DimensionRow;
use crate::domain::ids::{
    CompanyId, CurrencyId, LeadId, LineId, LinkedRecordId, MaterialLineId, PricelistId, TemplateId,
    UomId, ValueId, VariantId,
};
use crate::domain::product::{Combination, ProductNode};
use crate::errors::{ApplicationError, DomainError};

pub(crate) type LineKey = (TemplateId, LineId);

/// Ambient identifiers every backend call is scoped by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub currency_id: Option<CurrencyId>,
    pub company_id: Option<CompanyId>,
    pub pricelist_id: Option<PricelistId>,
    pub uom_id: Option<UomId>,
    pub so_date: Option<NaiveDate>,
    pub lead_id: Option<LeadId>,
    pub material_line_id: Option<MaterialLineId>,
    /// Thickness value picked on open when the main product has none.
    pub default_thickness: String,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            currency_id: None,
            company_id: None,
            pricelist_id: None,
            uom_id: None,
            so_date: None,
            lead_id: None,
            material_line_id: None,
            default_thickness: "5-7".to_owned(),
        }
    }
}

/// Custom text recorded on a previous save, replayed when editing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitialCustomValue {
    pub value_id: ValueId,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OpenRequest {
    pub template_id: TemplateId,
    pub quantity: Decimal,
    /// Combination of the material line being edited, if any.
    pub prior_combination: Vec<ValueId>,
    pub custom_values: Vec<InitialCustomValue>,
    /// Edit mode loads the main product only.
    pub edit: bool,
}

impl OpenRequest {
    pub fn new(template_id: TemplateId, quantity: Decimal) -> Self {
        Self {
            template_id,
            quantity,
            prior_combination: Vec::new(),
            custom_values: Vec::new(),
            edit: false,
        }
    }
}

/// One product configuration in progress: the main product, the optional
/// products the user may add, and everything picked for them so far.
pub struct ConfigurationSession<B> {
    pub(super) backend: B,
    pub(super) context: SessionContext,
    pub(super) session_id: Uuid,
    pub(super) main_template_id: TemplateId,
    pub(super) nodes: BTreeMap<TemplateId, ProductNode>,
    pub(super) selected: Vec<TemplateId>,
    pub(super) available: Vec<TemplateId>,
    pub(super) dimension_rows: BTreeMap<TemplateId, Vec<DimensionRow>>,
    pub(super) file_uploads: BTreeMap<LineKey, Vec<FileAttachment>>,
    pub(super) conditional_uploads: BTreeMap<LineKey, Vec<FileAttachment>>,
    pub(super) linked_records: BTreeMap<LineKey, LinkedRecordId>,
    pub(super) confirm_warning_pending: bool,
    pub(super) pricing: PricingSequencer,
}

impl<B: ConfiguratorBackend> ConfigurationSession<B> {
    pub async fn open(
        backend: B,
        context: SessionContext,
        request: OpenRequest,
    ) -> Result<Self, ApplicationError> {
        let load = LoadRequest {
            product_template_id: request.template_id,
            quantity: request.quantity,
            currency_id: context.currency_id,
            product_uom_id: context.uom_id,
            company_id: context.company_id,
            ptav_ids: request.prior_combination.clone(),
            only_main_product: request.edit,
            material_line_id: context.material_line_id,
        };
        let response = backend.get_values(&load).await.map_err(|error| {
            warn!(
                event_name = "configurator.session.load_failed",
                template_id = %request.template_id,
                error = %error,
                "could not load configurator values"
            );
            ApplicationError::from(error)
        })?;

        let mut session = Self::from_load_response(backend, context, response)?;
        let main_template_id = session.main_template_id;

        for custom in &request.custom_values {
            session.set_custom_value(main_template_id, custom.value_id, &custom.text).await?;
        }
        session.select_default_thickness().await?;
        session.check_exclusions(main_template_id)?;
        session.enrich_metadata().await;

        info!(
            event_name = "configurator.session.opened",
            session_id = %session.session_id,
            template_id = %main_template_id,
            optional_products = session.available.len(),
            "configuration session opened"
        );
        Ok(session)
    }

    async fn select_default_thickness(&mut self) -> Result<(), ApplicationError> {
        let main = self.main_product()?;
        let Some(line) = main.line_by_role(AttributeRole::Thickness) else {
            return Ok(());
        };
        if !line.selected_value_ids.is_empty() {
            return Ok(());
        }
        let Some(value) =
            line.values.iter().find(|value| value.name == self.context.default_thickness)
        else {
            return Ok(());
        };
        let (line_id, value_id) = (line.id, value.id);
        self.change_selection(self.main_template_id, line_id, value_id, false).await
    }

    /// Selects `value_id` on a line, then re-resolves exclusions and, when the
    /// combination is purchasable, re-prices the product.
    pub async fn change_selection(
        &mut self,
        template_id: TemplateId,
        line_id: LineId,
        value_id: ValueId,
        multi_value_allowed: bool,
    ) -> Result<(), ApplicationError> {
        let node = self.node_mut(template_id)?;
        let line = node
            .line_mut(line_id)
            .ok_or(DomainError::UnknownLine { template_id, line_id })?;
        line.select(value_id, multi_value_allowed)?;

        let synced_quantity = if line.attribute.is_quantity_attribute {
            line.first_selected().filter(|value| !value.is_custom).and_then(|value| value.numeric_value())
        } else {
            None
        };
        debug!(
            event_name = "configurator.session.selection_changed",
            session_id = %self.session_id,
            template_id = %template_id,
            line_id = %line_id,
            value_id = %value_id,
            "attribute selection changed"
        );

        self.check_exclusions(template_id)?;
        if let Some(quantity) = synced_quantity {
            self.set_quantity(template_id, quantity).await?;
        }

        if !self.node(template_id)?.is_valid_combination() {
            return Ok(());
        }
        let quantity = self.node(template_id)?.quantity;
        self.reprice(template_id, quantity).await?;

        let node = self.node_mut(template_id)?;
        if node.variant_id.is_none() && node.all_lines_always() {
            let combination = node.combination();
            node.archived_combinations.push(combination);
            debug!(
                event_name = "configurator.session.combination_archived",
                template_id = %template_id,
                "combination has no variant and was archived"
            );
            self.check_exclusions(template_id)?;
        }
        Ok(())
    }

    /// Stores custom text on the line whose selection holds `value_id`.
    pub async fn set_custom_value(
        &mut self,
        template_id: TemplateId,
        value_id: ValueId,
        text: &str,
    ) -> Result<(), ApplicationError> {
        let node = self.node_mut(template_id)?;
        let Some(line) = node.attribute_lines.iter_mut().find(|line| line.is_selected(value_id))
        else {
            debug!(
                event_name = "configurator.session.custom_value_ignored",
                template_id = %template_id,
                value_id = %value_id,
                "no line has the value selected"
            );
            return Ok(());
        };
        line.custom_value = Some(text.to_owned());

        if line.attribute.is_quantity_attribute {
            if let Some(quantity) = parse_number(text) {
                self.set_quantity(template_id, quantity).await?;
            }
        }
        Ok(())
    }

    /// Re-prices a product for `quantity`. A non-positive quantity resets the
    /// main product to one and removes an optional product.
    pub async fn set_quantity(
        &mut self,
        template_id: TemplateId,
        quantity: Decimal,
    ) -> Result<(), ApplicationError> {
        self.node(template_id)?;
        if quantity <= Decimal::ZERO {
            if template_id == self.main_template_id {
                self.reprice(template_id, Decimal::ONE).await?;
            } else if self.is_selected(template_id) {
                self.remove_product(template_id)?;
            }
            return Ok(());
        }

        self.reprice(template_id, quantity).await?;
        Ok(())
    }

    /// Requests a price for the current combination and applies it unless a
    /// newer request superseded it. Returns whether the response was applied.
    pub async fn reprice(
        &mut self,
        template_id: TemplateId,
        quantity: Decimal,
    ) -> Result<bool, ApplicationError> {
        let ticket = self.begin_pricing(template_id, quantity)?;
        let request = self.pricing_request(&ticket);
        let update = self.backend.update_combination(&request).await.map_err(|error| {
            warn!(
                event_name = "configurator.session.pricing_failed",
                session_id = %self.session_id,
                template_id = %template_id,
                error = %error,
                "pricing request failed; keeping last known price"
            );
            ApplicationError::from(error)
        })?;
        Ok(self.apply_pricing(&ticket, update))
    }

    /// Moves an available product into the selection and discovers its own
    /// optional products.
    pub async fn add_product(&mut self, template_id: TemplateId) -> Result<(), ApplicationError> {
        if !self.is_available(template_id) {
            return Err(DomainError::NotAvailable(template_id).into());
        }
        let node = self.node(template_id)?;
        let request = OptionalProductsRequest {
            product_template_id: template_id,
            combination: node.combination(),
            parent_combination: parent_combination(&self.nodes, node),
            currency_id: self.context.currency_id,
            so_date: self.context.so_date,
            company_id: self.context.company_id,
            pricelist_id: self.context.pricelist_id,
        };
        let fetched = self.backend.get_optional_products(&request).await.map_err(|error| {
            warn!(
                event_name = "configurator.session.optional_products_failed",
                session_id = %self.session_id,
                template_id = %template_id,
                error = %error,
                "could not fetch optional products"
            );
            ApplicationError::from(error)
        })?;

        self.available.retain(|id| *id != template_id);
        self.selected.push(template_id);

        let mut discovered = 0;
        for mut optional in fetched {
            let optional_id = optional.template_id;
            if optional_id == self.main_template_id || optional_id == template_id {
                continue;
            }
            if let Some(known) = self.nodes.get_mut(&optional_id) {
                known.parent_template_ids.insert(template_id);
                continue;
            }
            optional.parent_template_ids.insert(template_id);
            optional.normalize();
            self.nodes.insert(optional_id, optional);
            self.available.push(optional_id);
            discovered += 1;
        }
        self.init_dimension_rows();
        self.check_exclusions(template_id)?;

        info!(
            event_name = "configurator.session.product_added",
            session_id = %self.session_id,
            template_id = %template_id,
            discovered,
            "optional product added"
        );
        Ok(())
    }
}

impl<B> ConfigurationSession<B> {
    /// Builds a session from a `get_values` response. The first product is
    /// the main product.
    pub fn from_load_response(
        backend: B,
        context: SessionContext,
        response: LoadResponse,
    ) -> Result<Self, ApplicationError> {
        let mut products = response.products.into_iter();
        let Some(mut main) = products.next() else {
            return Err(ApplicationError::Integration(
                "configurator values contained no main product".to_owned(),
            ));
        };
        main.normalize();
        let main_template_id = main.template_id;

        let mut session = Self {
            backend,
            context,
            session_id: Uuid::new_v4(),
            main_template_id,
            nodes: BTreeMap::from([(main_template_id, main)]),
            selected: vec![main_template_id],
            available: Vec::new(),
            dimension_rows: BTreeMap::new(),
            file_uploads: BTreeMap::new(),
            conditional_uploads: BTreeMap::new(),
            linked_records: BTreeMap::new(),
            confirm_warning_pending: false,
            pricing: PricingSequencer::default(),
        };

        for mut product in products {
            product.normalize();
            session.insert_node(product, true);
        }
        for mut optional in response.optional_products {
            if optional.parent_template_ids.is_empty() {
                optional.parent_template_ids.insert(main_template_id);
            }
            optional.normalize();
            session.insert_node(optional, false);
        }

        session.check_exclusions(main_template_id)?;
        session.prefill_linked_records();
        session.init_dimension_rows();
        Ok(session)
    }

    fn insert_node(&mut self, node: ProductNode, selected: bool) {
        let template_id = node.template_id;
        if let Some(known) = self.nodes.get_mut(&template_id) {
            known.parent_template_ids.extend(node.parent_template_ids);
            return;
        }
        self.nodes.insert(template_id, node);
        if selected {
            self.selected.push(template_id);
        } else {
            self.available.push(template_id);
        }
    }

    fn prefill_linked_records(&mut self) {
        for template_id in &self.selected {
            let Some(node) = self.nodes.get(template_id) else {
                continue;
            };
            for line in node.attribute_lines.iter().filter(|line| line.is_linked_record()) {
                let linked = line.selected_values().find_map(|value| value.linked_record_id);
                if let Some(record_id) = linked {
                    self.linked_records.insert((*template_id, line.id), record_id);
                }
            }
        }
    }

    /// Moves a selected product back to the available set. Children left
    /// without a parent are detached recursively and forgotten.
    pub fn remove_product(&mut self, template_id: TemplateId) -> Result<(), DomainError> {
        if template_id == self.main_template_id {
            return Err(DomainError::MainProductRemoval(template_id));
        }
        if !self.is_selected(template_id) {
            return Err(DomainError::NotSelected(template_id));
        }

        let mut visited = BTreeSet::new();
        let mut surviving = Vec::new();
        self.detach(template_id, &mut visited, &mut surviving);
        // Survivors lost a parent, so its parent exclusions no longer apply.
        for child_id in surviving {
            if self.nodes.contains_key(&child_id) {
                resolve_from(&mut self.nodes, child_id);
            }
        }
        info!(
            event_name = "configurator.session.product_removed",
            session_id = %self.session_id,
            template_id = %template_id,
            cascaded = visited.len() - 1,
            "optional product removed"
        );
        Ok(())
    }

    fn detach(
        &mut self,
        template_id: TemplateId,
        visited: &mut BTreeSet<TemplateId>,
        surviving: &mut Vec<TemplateId>,
    ) {
        if !visited.insert(template_id) {
            return;
        }
        if let Some(position) = self.selected.iter().position(|id| *id == template_id) {
            self.selected.remove(position);
            self.available.push(template_id);
        }

        for child_id in child_ids(&self.nodes, template_id) {
            if child_id == self.main_template_id {
                continue;
            }
            let orphaned = match self.nodes.get_mut(&child_id) {
                Some(child) => {
                    child.parent_template_ids.remove(&template_id);
                    child.parent_template_ids.is_empty()
                }
                None => false,
            };
            if orphaned && !visited.contains(&child_id) {
                self.detach(child_id, visited, surviving);
                self.drop_node(child_id);
            } else if !orphaned {
                surviving.push(child_id);
            }
        }
    }

    fn drop_node(&mut self, template_id: TemplateId) {
        self.selected.retain(|id| *id != template_id);
        self.available.retain(|id| *id != template_id);
        self.nodes.remove(&template_id);
        self.dimension_rows.remove(&template_id);
        self.file_uploads.retain(|(owner, _), _| *owner != template_id);
        self.conditional_uploads.retain(|(owner, _), _| *owner != template_id);
        self.linked_records.retain(|(owner, _), _| *owner != template_id);
        self.pricing.forget(template_id);
        debug!(
            event_name = "configurator.session.product_dropped",
            template_id = %template_id,
            "orphaned optional product dropped"
        );
    }

    /// Recomputes excluded values of a product and all of its descendants.
    pub fn check_exclusions(&mut self, template_id: TemplateId) -> Result<(), DomainError> {
        self.node(template_id)?;
        let resolved = resolve_from(&mut self.nodes, template_id);
        debug!(
            event_name = "configurator.session.exclusions_resolved",
            template_id = %template_id,
            products = resolved.len(),
            "exclusions resolved"
        );
        Ok(())
    }

    pub fn is_valid_configuration(&self) -> bool {
        self.selected_products().all(ProductNode::is_valid_combination)
    }

    pub fn begin_pricing(
        &mut self,
        template_id: TemplateId,
        quantity: Decimal,
    ) -> Result<PricingTicket, DomainError> {
        let node = self.nodes.get(&template_id).ok_or(DomainError::UnknownProduct(template_id))?;
        Ok(self.pricing.issue(node, quantity))
    }

    pub fn pricing_request(&self, ticket: &PricingTicket) -> CombinationRequest {
        CombinationRequest {
            product_template_id: ticket.template_id,
            combination: ticket.combination.clone(),
            currency_id: self.context.currency_id,
            so_date: self.context.so_date,
            quantity: ticket.quantity,
            product_uom_id: self.context.uom_id,
            company_id: self.context.company_id,
            pricelist_id: self.context.pricelist_id,
        }
    }

    /// Applies a pricing response if its ticket is still the latest one for
    /// the product and the combination has not moved since.
    pub fn apply_pricing(&mut self, ticket: &PricingTicket, update: CombinationUpdate) -> bool {
        let Some(node) = self.nodes.get_mut(&ticket.template_id) else {
            return false;
        };
        if !self.pricing.is_current(ticket, node) {
            debug!(
                event_name = "configurator.session.pricing_discarded",
                template_id = %ticket.template_id,
                sequence = ticket.sequence,
                "stale pricing response discarded"
            );
            return false;
        }
        merge_update(node, ticket.quantity, update);
        true
    }

    pub fn set_linked_record(
        &mut self,
        template_id: TemplateId,
        line_id: LineId,
        record_id: Option<LinkedRecordId>,
    ) -> Result<(), DomainError> {
        let node = self.node_mut(template_id)?;
        let line = node
            .line_mut(line_id)
            .ok_or(DomainError::UnknownLine { template_id, line_id })?;
        if let Some(value) = line.first_selected_mut() {
            value.linked_record_id = record_id;
        }

        match record_id {
            Some(record_id) => self.linked_records.insert((template_id, line_id), record_id),
            None => self.linked_records.remove(&(template_id, line_id)),
        };
        Ok(())
    }

    /// Replaces the files of one line; an empty list clears them.
    pub fn set_attachments(
        &mut self,
        kind: AttachmentKind,
        template_id: TemplateId,
        line_id: LineId,
        files: Vec<FileAttachment>,
    ) -> Result<(), DomainError> {
        self.node(template_id)?
            .line(line_id)
            .ok_or(DomainError::UnknownLine { template_id, line_id })?;

        let store = match kind {
            AttachmentKind::FileUpload => &mut self.file_uploads,
            AttachmentKind::Conditional => &mut self.conditional_uploads,
        };
        if files.is_empty() {
            store.remove(&(template_id, line_id));
        } else {
            store.insert((template_id, line_id), files);
        }
        Ok(())
    }

    pub fn attachments(
        &self,
        kind: AttachmentKind,
        template_id: TemplateId,
        line_id: LineId,
    ) -> &[FileAttachment] {
        self.attachment_store(kind).get(&(template_id, line_id)).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every file of one kind attached to any line of the product.
    pub fn product_attachments(&self, kind: AttachmentKind, template_id: TemplateId) -> Vec<FileAttachment> {
        self.attachment_store(kind)
            .iter()
            .filter(|((owner, _), _)| *owner == template_id)
            .flat_map(|(_, files)| files.iter().cloned())
            .collect()
    }

    fn attachment_store(&self, kind: AttachmentKind) -> &BTreeMap<LineKey, Vec<FileAttachment>> {
        match kind {
            AttachmentKind::FileUpload => &self.file_uploads,
            AttachmentKind::Conditional => &self.conditional_uploads,
        }
    }

    pub fn linked_record(&self, template_id: TemplateId, line_id: LineId) -> Option<LinkedRecordId> {
        self.linked_records.get(&(template_id, line_id)).copied()
    }

    pub fn product_linked_records(&self, template_id: TemplateId) -> Vec<(LineId, LinkedRecordId)> {
        self.linked_records
            .iter()
            .filter(|((owner, _), _)| *owner == template_id)
            .map(|((_, line_id), record_id)| (*line_id, *record_id))
            .collect()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SessionContext {
        &mut self.context
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn main_template_id(&self) -> TemplateId {
        self.main_template_id
    }

    pub fn main_product(&self) -> Result<&ProductNode, DomainError> {
        self.node(self.main_template_id)
    }

    pub fn product(&self, template_id: TemplateId) -> Option<&ProductNode> {
        self.nodes.get(&template_id)
    }

    pub fn is_selected(&self, template_id: TemplateId) -> bool {
        self.selected.contains(&template_id)
    }

    pub fn is_available(&self, template_id: TemplateId) -> bool {
        self.available.contains(&template_id)
    }

    /// Selected products, main product first.
    pub fn selected_products(&self) -> impl Iterator<Item = &ProductNode> + '_ {
        self.selected.iter().filter_map(|template_id| self.nodes.get(template_id))
    }

    pub fn available_products(&self) -> impl Iterator<Item = &ProductNode> + '_ {
        self.available.iter().filter_map(|template_id| self.nodes.get(template_id))
    }

    pub(super) fn node(&self, template_id: TemplateId) -> Result<&ProductNode, DomainError> {
        self.nodes.get(&template_id).ok_or(DomainError::UnknownProduct(template_id))
    }

    pub(super) fn node_mut(&mut self, template_id: TemplateId) -> Result<&mut ProductNode, DomainError> {
        self.nodes.get_mut(&template_id).ok_or(DomainError::UnknownProduct(template_id))
    }

    /// Serializable summary of the session state.
    pub fn report(&self) -> SessionReport {
        let products = self
            .selected
            .iter()
            .map(|id| (id, true))
            .chain(self.available.iter().map(|id| (id, false)))
            .filter_map(|(template_id, selected)| {
                let node = self.nodes.get(template_id)?;
                Some(ProductReport {
                    template_id: node.template_id,
                    variant_id: node.variant_id,
                    display_name: node.display_name.clone(),
                    selected,
                    quantity: node.quantity,
                    price: node.price,
                    combination: node.combination(),
                    excluded_values: node
                        .attribute_lines
                        .iter()
                        .flat_map(|line| line.values.iter())
                        .filter(|value| value.excluded)
                        .map(|value| value.id)
                        .collect(),
                    valid: node.is_valid_combination(),
                    visible_lines: self
                        .visible_lines(node.template_id)
                        .map(|lines| lines.iter().map(|line| line.id).collect())
                        .unwrap_or_default(),
                    dimension_rows: self.dimension_rows.get(template_id).map_or(0, Vec::len),
                })
            })
            .collect();

        SessionReport {
            session_id: self.session_id,
            main_template_id: self.main_template_id,
            valid: self.is_valid_configuration(),
            products,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub main_template_id: TemplateId,
    pub valid: bool,
    pub products: Vec<ProductReport>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductReport {
    pub template_id: TemplateId,
    pub variant_id: Option<VariantId>,
    pub display_name: String,
    pub selected: bool,
    pub quantity: Decimal,
    pub price: Decimal,
    pub combination: Combination,
    pub excluded_values: Vec<ValueId>,
    pub valid: bool,
    pub visible_lines: Vec<LineId>,
    pub dimension_rows: usize,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{ConfigurationSession, OpenRequest, SessionContext};
    use crate::configurator::backend::{AttributeMetadata, LinkedRecordFlags, LoadResponse, ValueFlags};
    use crate::configurator::testing::{line_json, optional_json, product_json, BackendCall, FakeBackend};
    use crate::domain::attachment::{AttachmentKind, FileAttachment};
    use crate::domain::dimension::DimensionUpdate;
    use crate::domain::ids::{AttributeId, LineId, LinkedRecordId, TemplateId, ValueId};
    use crate::domain::product::ProductNode;
    use crate::errors::{ApplicationError, DomainError};

    const MAIN: TemplateId = TemplateId(10);

    fn sheet_lines() -> Vec<serde_json::Value> {
        vec![
            line_json(1, "Type of FRP Sheet", "radio", &[(11, "Opaque"), (12, "Translucent")], &[11]),
            line_json(2, "Finish", "radio", &[(21, "Matte"), (22, "Gloss")], &[21]),
        ]
    }

    fn sheet_load() -> LoadResponse {
        LoadResponse {
            products: vec![product_json(10, sheet_lines(), json!({"exclusions": {"11": [22], "22": [11]}}))],
            optional_products: vec![product_json(
                20,
                vec![line_json(3, "Edge", "radio", &[(31, "Raw"), (32, "Sealed")], &[31])],
                json!({"parent_product_tmpl_ids": [10], "parent_exclusions": {"12": [32]}}),
            )],
        }
    }

    async fn open(backend: FakeBackend) -> ConfigurationSession<FakeBackend> {
        ConfigurationSession::open(backend, SessionContext::default(), OpenRequest::new(MAIN, Decimal::ONE))
            .await
            .expect("session opens")
    }

    fn product<B>(session: &ConfigurationSession<B>, template_id: i64) -> &ProductNode {
        session.product(TemplateId(template_id)).expect("product in session")
    }

    #[tokio::test]
    async fn open_builds_selected_and_available_products() {
        let session = open(FakeBackend::new(sheet_load())).await;

        assert_eq!(session.main_template_id(), MAIN);
        assert!(session.is_selected(MAIN));
        assert!(session.is_available(TemplateId(20)));
        assert_eq!(product(&session, 20).parent_template_ids.len(), 1);
        assert!(product(&session, 10).value(ValueId(22)).expect("gloss").excluded);
        assert!(session.is_valid_configuration());

        let calls = session.backend().calls();
        assert!(matches!(calls.first(), Some(BackendCall::GetValues(request))
            if request.product_template_id == MAIN && !request.only_main_product));
        assert!(calls.iter().any(|call| matches!(call, BackendCall::ReadAttributes(_))));
    }

    #[tokio::test]
    async fn edit_mode_loads_only_the_main_product() {
        let mut request = OpenRequest::new(MAIN, Decimal::ONE);
        request.edit = true;
        request.prior_combination = vec![ValueId(12), ValueId(21)];

        let session = ConfigurationSession::open(FakeBackend::new(sheet_load()), SessionContext::default(), request)
            .await
            .expect("session opens");

        assert_eq!(session.available_products().count(), 0);
        assert!(matches!(session.backend().calls().first(), Some(BackendCall::GetValues(request))
            if request.ptav_ids == vec![ValueId(12), ValueId(21)]));
    }

    #[tokio::test]
    async fn valid_selection_is_repriced_and_propagates_to_children() {
        let mut session = open(FakeBackend::new(sheet_load()).with_unit_price(10, Decimal::new(125, 0))).await;

        session.change_selection(MAIN, LineId(1), ValueId(12), false).await.expect("selection applies");

        let pricing = session.backend().pricing_calls();
        assert_eq!(pricing.len(), 1);
        assert_eq!(pricing[0].combination, vec![ValueId(12), ValueId(21)]);
        assert_eq!(product(&session, 10).price, Decimal::new(125, 0));
        assert!(product(&session, 20).value(ValueId(32)).expect("sealed").excluded);
    }

    #[tokio::test]
    async fn excluded_selection_is_not_priced() {
        let mut session = open(FakeBackend::new(sheet_load())).await;

        session.change_selection(MAIN, LineId(2), ValueId(22), false).await.expect("selection applies");

        assert!(!session.is_valid_configuration());
        assert!(!product(&session, 10).is_valid_combination());
        assert!(session.backend().pricing_calls().is_empty());
    }

    #[tokio::test]
    async fn quantity_attribute_drives_the_product_quantity() {
        let mut lines = sheet_lines();
        lines.push(json!({
            "id": 5,
            "attribute": {"id": 5, "name": "Quantity", "display_type": "select", "is_quantity": true},
            "attribute_values": [{"id": 51, "name": "5"}, {"id": 52, "name": "Custom", "is_custom": true}],
            "selected_attribute_value_ids": [],
            "create_variant": "no_variant"
        }));
        let load = LoadResponse { products: vec![product_json(10, lines, json!({}))], optional_products: vec![] };
        let mut session = open(FakeBackend::new(load)).await;

        session.change_selection(MAIN, LineId(5), ValueId(51), false).await.expect("preset quantity");
        assert_eq!(product(&session, 10).quantity, Decimal::new(5, 0));
        assert_eq!(product(&session, 10).price, Decimal::new(50, 0));

        session.change_selection(MAIN, LineId(5), ValueId(52), false).await.expect("custom quantity");
        session.set_custom_value(MAIN, ValueId(52), "7.5").await.expect("custom text");
        assert_eq!(product(&session, 10).quantity, Decimal::new(75, 1));
        assert_eq!(
            product(&session, 10).line(LineId(5)).and_then(|line| line.custom_value.as_deref()),
            Some("7.5")
        );
    }

    #[tokio::test]
    async fn non_positive_quantity_resets_main_and_removes_optional() {
        let mut session = open(FakeBackend::new(sheet_load())).await;
        session.add_product(TemplateId(20)).await.expect("add optional");

        session.set_quantity(MAIN, Decimal::ZERO).await.expect("reset main");
        assert_eq!(product(&session, 10).quantity, Decimal::ONE);
        assert_eq!(session.backend().pricing_calls().last().map(|call| call.quantity), Some(Decimal::ONE));

        session.set_quantity(TemplateId(20), Decimal::new(-1, 0)).await.expect("remove optional");
        assert!(!session.is_selected(TemplateId(20)));
        assert!(session.is_available(TemplateId(20)));
    }

    #[tokio::test]
    async fn remove_then_add_restores_the_product_with_its_selection() {
        let backend = FakeBackend::new(sheet_load())
            .with_optional_products(20, vec![optional_json(30, 20, vec![])]);
        let mut session = open(backend).await;

        session.add_product(TemplateId(20)).await.expect("add");
        session.change_selection(TemplateId(20), LineId(3), ValueId(32), false).await.expect("select");
        assert!(session.is_available(TemplateId(30)));

        session.remove_product(TemplateId(20)).expect("remove");
        assert!(session.product(TemplateId(30)).is_none());

        session.add_product(TemplateId(20)).await.expect("re-add");
        assert!(session.is_selected(TemplateId(20)));
        assert_eq!(product(&session, 20).combination(), vec![ValueId(32)]);
        assert!(session.is_available(TemplateId(30)));
    }

    fn cascade_backend() -> FakeBackend {
        let mut load = sheet_load();
        load.optional_products.push(optional_json(40, 10, vec![]));
        FakeBackend::new(load)
            .with_optional_products(20, vec![optional_json(30, 20, vec![])])
            .with_optional_products(30, vec![optional_json(50, 30, vec![])])
            .with_optional_products(40, vec![optional_json(50, 40, vec![])])
    }

    #[tokio::test]
    async fn removal_cascades_through_orphaned_children() {
        let mut session = open(cascade_backend()).await;
        for template_id in [20, 30, 50] {
            session.add_product(TemplateId(template_id)).await.expect("add chain");
        }

        session.remove_product(TemplateId(20)).expect("remove root of chain");

        assert!(session.is_available(TemplateId(20)));
        assert!(session.product(TemplateId(30)).is_none());
        assert!(session.product(TemplateId(50)).is_none());
        assert_eq!(session.selected_products().count(), 1);
    }

    #[tokio::test]
    async fn child_with_another_selected_parent_survives_removal() {
        let mut session = open(cascade_backend()).await;
        for template_id in [20, 30, 40, 50] {
            session.add_product(TemplateId(template_id)).await.expect("add graph");
        }
        assert_eq!(product(&session, 50).parent_template_ids.len(), 2);

        session.remove_product(TemplateId(20)).expect("remove");

        assert!(session.product(TemplateId(30)).is_none());
        assert!(session.is_selected(TemplateId(50)));
        assert_eq!(
            product(&session, 50).parent_template_ids.iter().copied().collect::<Vec<_>>(),
            vec![TemplateId(40)]
        );
    }

    #[tokio::test]
    async fn surviving_child_drops_exclusions_of_the_removed_parent() {
        let mut load = sheet_load();
        load.optional_products.push(optional_json(40, 10, vec![]));
        let shared = || {
            product_json(
                50,
                vec![line_json(5, "Trim", "radio", &[(51, "Flush"), (52, "Raised")], &[51])],
                json!({"parent_exclusions": {"31": [51]}}),
            )
        };
        let backend = FakeBackend::new(load)
            .with_optional_products(20, vec![shared()])
            .with_optional_products(40, vec![shared()]);
        let mut session = open(backend).await;
        for template_id in [20, 40, 50] {
            session.add_product(TemplateId(template_id)).await.expect("add graph");
        }
        assert!(product(&session, 50).value(ValueId(51)).expect("v51").excluded);
        assert!(!session.is_valid_configuration());

        session.remove_product(TemplateId(20)).expect("remove");

        assert_eq!(
            product(&session, 50).parent_template_ids.iter().copied().collect::<Vec<_>>(),
            vec![TemplateId(40)]
        );
        assert!(!product(&session, 50).value(ValueId(51)).expect("v51").excluded);
        assert!(session.is_valid_configuration());
    }

    #[tokio::test]
    async fn membership_errors_are_reported() {
        let mut session = open(FakeBackend::new(sheet_load())).await;

        assert_eq!(session.remove_product(MAIN), Err(DomainError::MainProductRemoval(MAIN)));
        assert_eq!(session.remove_product(TemplateId(20)), Err(DomainError::NotSelected(TemplateId(20))));
        assert_eq!(
            session.add_product(TemplateId(99)).await,
            Err(ApplicationError::Domain(DomainError::NotAvailable(TemplateId(99))))
        );
    }

    #[tokio::test]
    async fn combination_without_variant_is_archived() {
        let mut session = open(FakeBackend::new(sheet_load()).without_variant(10)).await;

        session.change_selection(MAIN, LineId(1), ValueId(12), false).await.expect("selection applies");

        let main = product(&session, 10);
        assert_eq!(main.variant_id, None);
        assert_eq!(main.archived_combinations.last(), Some(&vec![ValueId(12), ValueId(21)]));
        assert!(!session.is_valid_configuration());
    }

    #[tokio::test]
    async fn pricing_failure_keeps_the_last_known_price() {
        let mut session = open(FakeBackend::new(sheet_load()).failing_pricing()).await;

        let error = session
            .change_selection(MAIN, LineId(1), ValueId(12), false)
            .await
            .expect_err("pricing fails");

        assert!(matches!(error, ApplicationError::Integration(message) if message.contains("pricelist unavailable")));
        assert_eq!(product(&session, 10).price, Decimal::TEN);
    }

    #[test]
    fn stale_pricing_responses_are_discarded() {
        let load = sheet_load();
        let mut session =
            ConfigurationSession::from_load_response(FakeBackend::new(load.clone()), SessionContext::default(), load)
                .expect("session");

        let older = session.begin_pricing(MAIN, Decimal::ONE).expect("ticket");
        let newer = session.begin_pricing(MAIN, Decimal::TWO).expect("ticket");
        let update = crate::configurator::backend::CombinationUpdate {
            price: Decimal::new(99, 0),
            ..Default::default()
        };

        assert!(!session.apply_pricing(&older, update.clone()));
        assert_eq!(product(&session, 10).price, Decimal::TEN);
        assert!(session.apply_pricing(&newer, update));
        assert_eq!(product(&session, 10).quantity, Decimal::TWO);
        assert_eq!(session.pricing_request(&newer).combination, vec![ValueId(11), ValueId(21)]);
    }

    #[tokio::test]
    async fn open_selects_default_thickness_and_prefills_linked_records() {
        let mut lines = sheet_lines();
        lines.push(line_json(6, "Thickness", "select", &[(61, "3-4"), (62, "5-7")], &[]));
        lines.push(json!({
            "id": 7,
            "attribute": {"id": 7, "name": "Raisin Type", "display_type": "m2o"},
            "attribute_values": [{"id": 71, "name": "Ortho", "m2o_res_id": [42, "Ortho"]}],
            "selected_attribute_value_ids": [71]
        }));
        let load = LoadResponse { products: vec![product_json(10, lines, json!({}))], optional_products: vec![] };

        let mut session = open(FakeBackend::new(load)).await;

        assert_eq!(
            product(&session, 10).line(LineId(6)).map(|line| line.selected_value_ids.clone()),
            Some(vec![ValueId(62)])
        );
        assert_eq!(session.linked_record(MAIN, LineId(7)), Some(LinkedRecordId(42)));

        session.set_linked_record(MAIN, LineId(7), Some(LinkedRecordId(43))).expect("set record");
        assert_eq!(
            product(&session, 10).value(ValueId(71)).and_then(|value| value.linked_record_id),
            Some(LinkedRecordId(43))
        );
        session.set_linked_record(MAIN, LineId(7), None).expect("clear record");
        assert_eq!(session.linked_record(MAIN, LineId(7)), None);
    }

    #[tokio::test]
    async fn attachments_are_replaced_and_cleared_per_line() {
        let mut session = open(FakeBackend::new(sheet_load())).await;
        let drawing = FileAttachment::new("drawing.pdf", "JVBERi0=").with_mimetype("application/pdf");

        session
            .set_attachments(AttachmentKind::Conditional, MAIN, LineId(1), vec![drawing.clone()])
            .expect("attach");
        assert_eq!(session.attachments(AttachmentKind::Conditional, MAIN, LineId(1)), &[drawing]);
        assert!(session.attachments(AttachmentKind::FileUpload, MAIN, LineId(1)).is_empty());

        session.set_attachments(AttachmentKind::Conditional, MAIN, LineId(1), Vec::new()).expect("clear");
        assert!(session.product_attachments(AttachmentKind::Conditional, MAIN).is_empty());

        assert_eq!(
            session.set_attachments(AttachmentKind::FileUpload, MAIN, LineId(9), Vec::new()),
            Err(DomainError::UnknownLine { template_id: MAIN, line_id: LineId(9) })
        );
    }

    fn dimension_load() -> LoadResponse {
        let lines = vec![
            line_json(1, "Length", "strictly_numeric", &[(11, "Custom")], &[11]),
            line_json(2, "Width", "strictly_numeric", &[(21, "Custom")], &[21]),
            line_json(3, "Length UOM", "select", &[(31, "mm"), (32, "cm")], &[32]),
            line_json(4, "Width UOM", "select", &[(41, "mm")], &[]),
            line_json(5, "Finish", "radio", &[(51, "Matte")], &[51]),
        ];
        let mut product = product_json(10, lines, json!({}));
        for line in product.attribute_lines.iter_mut().take(2) {
            if let Some(value) = line.values.first_mut() {
                value.is_custom = true;
            }
        }
        LoadResponse { products: vec![product], optional_products: vec![] }
    }

    #[tokio::test]
    async fn dimension_rows_start_from_the_selected_units() {
        let mut session = open(FakeBackend::new(dimension_load())).await;

        let rows = session.dimension_rows(MAIN);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].length_uom, Some(ValueId(32)));
        assert_eq!(rows[0].width_uom, Some(ValueId(41)));
        assert_eq!(rows[0].qty, "1");

        session.update_dimension_row(MAIN, 0, DimensionUpdate::Width("120".to_owned())).expect("width");
        let index = session.add_dimension_row(MAIN).expect("add row");
        assert_eq!(index, 1);
        assert_eq!(session.dimension_rows(MAIN)[1].width, "120");
        assert_eq!(session.dimension_rows(MAIN)[1].length, "");

        session.remove_dimension_row(MAIN, 0).expect("remove");
        session.remove_dimension_row(MAIN, 0).expect("remove last");
        assert_eq!(session.dimension_rows(MAIN).len(), 1);

        let visible = session.visible_lines(MAIN).expect("lines").iter().map(|line| line.id).collect::<Vec<_>>();
        assert_eq!(visible, vec![LineId(5)]);
        assert_eq!(session.uom_options(MAIN, crate::domain::dimension::DimensionAxis::Length).expect("uoms").len(), 2);
    }

    #[tokio::test]
    async fn width_auto_fill_switches_to_the_custom_value() {
        let mut session = open(FakeBackend::new(dimension_load())).await;
        session.update_dimension_row(MAIN, 0, DimensionUpdate::Length("300".to_owned())).expect("length");

        session.auto_fill_width(MAIN, "1220").expect("auto fill");
        assert_eq!(session.dimension_rows(MAIN)[0].width, "1220");

        session.sync_dimensions_to_attributes();
        let main = product(&session, 10);
        assert_eq!(main.line(LineId(1)).and_then(|line| line.custom_value.as_deref()), Some("300"));
        assert_eq!(main.line(LineId(2)).and_then(|line| line.custom_value.as_deref()), Some("1220"));
        assert_eq!(main.line(LineId(4)).map(|line| line.selected_value_ids.clone()), Some(vec![ValueId(41)]));
    }

    #[tokio::test]
    async fn update_of_a_missing_row_is_rejected() {
        let mut session = open(FakeBackend::new(dimension_load())).await;
        let error = session
            .update_dimension_row(MAIN, 4, DimensionUpdate::Length("1".to_owned()))
            .expect_err("no such row");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    fn linked_load() -> LoadResponse {
        let mut lines = sheet_lines();
        lines.push(json!({
            "id": 7,
            "attribute": {
                "id": 7, "name": "Raisin Type", "display_type": "m2o",
                "m2o_values": [{"id": 42, "name": "Ortho"}, {"id": 43, "name": "Iso"}]
            },
            "attribute_values": [{"id": 71, "name": "Ortho", "m2o_res_id": 42}],
            "selected_attribute_value_ids": [71]
        }));
        lines.push(json!({
            "id": 8,
            "attribute": {"id": 8, "name": "Gel-coat", "display_type": "m2o"},
            "attribute_values": [{"id": 81, "name": "White", "m2o_res_id": 55}],
            "selected_attribute_value_ids": []
        }));
        LoadResponse { products: vec![product_json(10, lines, json!({}))], optional_products: vec![] }
    }

    fn linked_metadata() -> Vec<AttributeMetadata> {
        vec![
            AttributeMetadata {
                id: AttributeId(7),
                is_width_check: false,
                pair_with_previous: true,
                is_quantity: false,
                is_gelcoat_required_flag: false,
                linked_model: Some("raisin.type".to_owned()),
            },
            AttributeMetadata {
                id: AttributeId(8),
                is_width_check: false,
                pair_with_previous: false,
                is_quantity: false,
                is_gelcoat_required_flag: true,
                linked_model: Some("gel.coat".to_owned()),
            },
        ]
    }

    #[tokio::test]
    async fn enrichment_applies_attribute_value_and_linked_flags() {
        let backend = FakeBackend::new(linked_load())
            .with_attribute_metadata(linked_metadata())
            .with_value_flags(vec![ValueFlags { id: ValueId(71), is_opaque: false, is_translucent: true }])
            .with_linked_flags(
                "raisin.type",
                vec![
                    LinkedRecordFlags { id: LinkedRecordId(42), is_opaque: true, is_translucent: false },
                    LinkedRecordFlags { id: LinkedRecordId(43), is_opaque: false, is_translucent: true },
                ],
            )
            .failing_model("gel.coat");

        let session = open(backend).await;
        let main = product(&session, 10);

        let resin = main.line(LineId(7)).expect("resin line");
        assert!(resin.attribute.pair_with_previous);
        assert_eq!(resin.attribute.linked_model.as_deref(), Some("raisin.type"));
        assert!(resin.values[0].is_opaque && !resin.values[0].is_translucent);
        assert!(resin.attribute.linked_options[1].is_translucent);
        assert!(main.line(LineId(8)).expect("gel-coat line").attribute.is_gelcoat_required_flag);

        let linked_reads = session
            .backend()
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::ReadLinked(model, ids) => Some((model, ids)),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            linked_reads,
            vec![
                ("gel.coat".to_owned(), vec![LinkedRecordId(55)]),
                ("raisin.type".to_owned(), vec![LinkedRecordId(42), LinkedRecordId(43)]),
            ]
        );
    }

    #[tokio::test]
    async fn enrichment_failure_leaves_flags_unset() {
        let session = open(FakeBackend::new(linked_load()).failing_attribute_reads()).await;

        let main = product(&session, 10);
        assert!(main.line(LineId(7)).expect("resin line").attribute.linked_model.is_none());
        assert!(!session.backend().calls().iter().any(|call| matches!(call, BackendCall::ReadValues(_))));
    }

    #[tokio::test]
    async fn report_lists_products_with_validity() {
        let session = open(FakeBackend::new(sheet_load())).await;

        let report = session.report();

        assert!(report.valid);
        assert_eq!(report.main_template_id, MAIN);
        assert_eq!(report.products.len(), 2);
        assert!(report.products[0].selected && !report.products[1].selected);
        assert_eq!(report.products[0].excluded_values, vec![ValueId(22)]);
    }
}
