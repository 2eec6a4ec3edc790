//! In-memory backend and payload fixtures for session tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::configurator::backend::{
    AttributeMetadata, CombinationRequest, CombinationUpdate, ConfiguratorBackend, LinkedRecordFlags,
    LoadRequest, LoadResponse, OptionalProductsRequest, SaveResponse, ValueFlags,
};
use crate::configurator::submission::SubmissionPayload;
use crate::domain::ids::{AttributeId, LinkedRecordId, TemplateId, ValueId, VariantId};
use crate::domain::product::ProductNode;
use crate::errors::BackendError;

#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    GetValues(LoadRequest),
    CreateVariant(TemplateId, Vec<ValueId>),
    UpdateCombination(CombinationRequest),
    GetOptionalProducts(OptionalProductsRequest),
    Save(SubmissionPayload),
    ReadAttributes(Vec<AttributeId>),
    ReadValues(Vec<ValueId>),
    ReadLinked(String, Vec<LinkedRecordId>),
}

pub struct FakeBackend {
    load: LoadResponse,
    unit_prices: BTreeMap<TemplateId, Decimal>,
    missing_variants: Vec<TemplateId>,
    optional_products: BTreeMap<TemplateId, Vec<ProductNode>>,
    save_response: SaveResponse,
    fail_pricing: bool,
    fail_attributes: bool,
    failing_models: Vec<String>,
    attribute_metadata: Vec<AttributeMetadata>,
    value_flags: Vec<ValueFlags>,
    linked_flags: BTreeMap<String, Vec<LinkedRecordFlags>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl FakeBackend {
    pub fn new(load: LoadResponse) -> Self {
        Self {
            load,
            unit_prices: BTreeMap::new(),
            missing_variants: Vec::new(),
            optional_products: BTreeMap::new(),
            save_response: SaveResponse { success: true, error: None },
            fail_pricing: false,
            fail_attributes: false,
            failing_models: Vec::new(),
            attribute_metadata: Vec::new(),
            value_flags: Vec::new(),
            linked_flags: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_unit_price(mut self, template_id: i64, price: Decimal) -> Self {
        self.unit_prices.insert(TemplateId(template_id), price);
        self
    }

    /// Pricing for this template answers without a variant id.
    pub fn without_variant(mut self, template_id: i64) -> Self {
        self.missing_variants.push(TemplateId(template_id));
        self
    }

    pub fn with_optional_products(mut self, template_id: i64, products: Vec<ProductNode>) -> Self {
        self.optional_products.insert(TemplateId(template_id), products);
        self
    }

    pub fn with_save_response(mut self, response: SaveResponse) -> Self {
        self.save_response = response;
        self
    }

    pub fn failing_pricing(mut self) -> Self {
        self.fail_pricing = true;
        self
    }

    pub fn failing_attribute_reads(mut self) -> Self {
        self.fail_attributes = true;
        self
    }

    pub fn failing_model(mut self, model: &str) -> Self {
        self.failing_models.push(model.to_owned());
        self
    }

    pub fn with_attribute_metadata(mut self, metadata: Vec<AttributeMetadata>) -> Self {
        self.attribute_metadata = metadata;
        self
    }

    pub fn with_value_flags(mut self, flags: Vec<ValueFlags>) -> Self {
        self.value_flags = flags;
        self
    }

    pub fn with_linked_flags(mut self, model: &str, flags: Vec<LinkedRecordFlags>) -> Self {
        self.linked_flags.insert(model.to_owned(), flags);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn pricing_calls(&self) -> Vec<CombinationRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::UpdateCombination(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn saved_payloads(&self) -> Vec<SubmissionPayload> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Save(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ConfiguratorBackend for FakeBackend {
    async fn get_values(&self, request: &LoadRequest) -> Result<LoadResponse, BackendError> {
        self.record(BackendCall::GetValues(request.clone()));
        let mut response = self.load.clone();
        if request.only_main_product {
            response.optional_products.clear();
        }
        Ok(response)
    }

    async fn create_variant(
        &self,
        template_id: TemplateId,
        combination: &[ValueId],
    ) -> Result<VariantId, BackendError> {
        self.record(BackendCall::CreateVariant(template_id, combination.to_vec()));
        Ok(VariantId(template_id.0 * 1000))
    }

    async fn update_combination(
        &self,
        request: &CombinationRequest,
    ) -> Result<CombinationUpdate, BackendError> {
        self.record(BackendCall::UpdateCombination(request.clone()));
        if self.fail_pricing {
            return Err(BackendError::Remote {
                route: "/crm_product_configurator/update_combination".to_owned(),
                message: "pricelist unavailable".to_owned(),
            });
        }
        let template_id = request.product_template_id;
        let unit_price = self.unit_prices.get(&template_id).copied().unwrap_or(Decimal::TEN);
        let variant_id = (!self.missing_variants.contains(&template_id))
            .then_some(VariantId(template_id.0 * 100));
        Ok(CombinationUpdate {
            price: unit_price * request.quantity,
            variant_id,
            display_name: None,
            description: None,
        })
    }

    async fn get_optional_products(
        &self,
        request: &OptionalProductsRequest,
    ) -> Result<Vec<ProductNode>, BackendError> {
        self.record(BackendCall::GetOptionalProducts(request.clone()));
        Ok(self.optional_products.get(&request.product_template_id).cloned().unwrap_or_default())
    }

    async fn save(&self, payload: &SubmissionPayload) -> Result<SaveResponse, BackendError> {
        self.record(BackendCall::Save(payload.clone()));
        Ok(self.save_response.clone())
    }

    async fn read_attribute_metadata(
        &self,
        attribute_ids: &[AttributeId],
    ) -> Result<Vec<AttributeMetadata>, BackendError> {
        self.record(BackendCall::ReadAttributes(attribute_ids.to_vec()));
        if self.fail_attributes {
            return Err(BackendError::Transport("connection reset".to_owned()));
        }
        Ok(self.attribute_metadata.clone())
    }

    async fn read_value_flags(&self, value_ids: &[ValueId]) -> Result<Vec<ValueFlags>, BackendError> {
        self.record(BackendCall::ReadValues(value_ids.to_vec()));
        Ok(self.value_flags.clone())
    }

    async fn read_linked_record_flags(
        &self,
        model: &str,
        record_ids: &[LinkedRecordId],
    ) -> Result<Vec<LinkedRecordFlags>, BackendError> {
        self.record(BackendCall::ReadLinked(model.to_owned(), record_ids.to_vec()));
        if self.failing_models.iter().any(|failing| failing == model) {
            return Err(BackendError::Remote {
                route: format!("/web/dataset/call_kw/{model}/read"),
                message: "access denied".to_owned(),
            });
        }
        Ok(self.linked_flags.get(model).cloned().unwrap_or_default())
    }
}

/// Attribute line payload as `get_values` sends it.
pub fn line_json(
    id: i64,
    name: &str,
    display_type: &str,
    values: &[(i64, &str)],
    selected: &[i64],
) -> Value {
    json!({
        "id": id,
        "attribute": {"id": id, "name": name, "display_type": display_type},
        "attribute_values": values
            .iter()
            .map(|(value_id, value_name)| json!({"id": value_id, "name": value_name}))
            .collect::<Vec<_>>(),
        "selected_attribute_value_ids": selected,
        "create_variant": "always",
    })
}

/// Product payload; `extra` fields override the defaults.
pub fn product_json(template_id: i64, lines: Vec<Value>, extra: Value) -> ProductNode {
    let mut payload = json!({
        "product_tmpl_id": template_id,
        "id": template_id * 100,
        "display_name": format!("Product {template_id}"),
        "price": 10,
        "quantity": 1,
        "attribute_lines": lines,
        "exclusions": {},
        "parent_exclusions": {},
        "archived_combinations": [],
        "parent_product_tmpl_ids": [],
    });
    if let (Some(target), Some(extra)) = (payload.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }
    match serde_json::from_value(payload) {
        Ok(product) => product,
        Err(error) => panic!("invalid product fixture {template_id}: {error}"),
    }
}

pub fn optional_json(template_id: i64, parent: i64, lines: Vec<Value>) -> ProductNode {
    product_json(template_id, lines, json!({"parent_product_tmpl_ids": [parent]}))
}

/// Main product exercising file, linked-record and gel-coat rules.
///
/// Lines: 1 sheet type, 2 gel-coat requirement (No), 3 gel-coat (linked,
/// flagged), 4 resin (linked, record 42), 5 drawing (value 52 needs a file),
/// 6 file upload, 7 custom notes.
pub fn crm_sheet_load() -> LoadResponse {
    let lines = vec![
        line_json(1, "Type of FRP Sheet", "radio", &[(11, "Opaque"), (12, "Translucent")], &[11]),
        line_json(2, "Gel Coat REQ", "radio", &[(21, "Yes"), (22, "No")], &[22]),
        json!({
            "id": 3,
            "attribute": {"id": 3, "name": "Gel-coat", "display_type": "m2o", "is_gelcoat_required_flag": true},
            "attribute_values": [{"id": 31, "name": "Gel-coat", "m2o_res_id": false}],
            "selected_attribute_value_ids": [],
            "create_variant": "no_variant",
        }),
        json!({
            "id": 4,
            "attribute": {"id": 4, "name": "Raisin Type", "display_type": "m2o"},
            "attribute_values": [{"id": 41, "name": "Raisin Type", "m2o_res_id": [42, "Ortho"]}],
            "selected_attribute_value_ids": [41],
            "create_variant": "no_variant",
        }),
        json!({
            "id": 5,
            "attribute": {"id": 5, "name": "Drawing", "display_type": "radio"},
            "attribute_values": [
                {"id": 51, "name": "Standard"},
                {"id": 52, "name": "Custom drawing", "required_file": true}
            ],
            "selected_attribute_value_ids": [51],
            "create_variant": "no_variant",
        }),
        json!({
            "id": 6,
            "attribute": {"id": 6, "name": "Upload", "display_type": "file_upload"},
            "attribute_values": [{"id": 61, "name": "File"}],
            "selected_attribute_value_ids": [61],
            "create_variant": "no_variant",
        }),
        json!({
            "id": 7,
            "attribute": {"id": 7, "name": "Notes", "display_type": "radio"},
            "attribute_values": [{"id": 71, "name": "Custom", "is_custom": true}],
            "selected_attribute_value_ids": [71],
            "customValue": "",
            "create_variant": "no_variant",
        }),
    ];
    LoadResponse {
        products: vec![product_json(10, lines, json!({}))],
        optional_products: vec![optional_json(20, 10, vec![])],
    }
}
