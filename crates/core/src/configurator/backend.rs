use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::configurator::submission::SubmissionPayload;
use crate::domain::ids::{
    AttributeId, CompanyId, CurrencyId, LinkedRecordId, MaterialLineId, PricelistId, TemplateId,
    UomId, ValueId, VariantId,
};
use crate::domain::product::ProductNode;
use crate::domain::wire;
use crate::errors::BackendError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoadRequest {
    pub product_template_id: TemplateId,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub currency_id: Option<CurrencyId>,
    pub product_uom_id: Option<UomId>,
    pub company_id: Option<CompanyId>,
    pub ptav_ids: Vec<ValueId>,
    pub only_main_product: bool,
    #[serde(serialize_with = "wire::none_as_false")]
    pub material_line_id: Option<MaterialLineId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadResponse {
    #[serde(default)]
    pub products: Vec<ProductNode>,
    #[serde(default)]
    pub optional_products: Vec<ProductNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CombinationRequest {
    pub product_template_id: TemplateId,
    pub combination: Vec<ValueId>,
    pub currency_id: Option<CurrencyId>,
    pub so_date: Option<NaiveDate>,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    pub product_uom_id: Option<UomId>,
    pub company_id: Option<CompanyId>,
    pub pricelist_id: Option<PricelistId>,
}

/// Price and derived fields for one combination.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinationUpdate {
    #[serde(default, deserialize_with = "wire::falsy_or_default")]
    pub price: Decimal,
    #[serde(default, rename = "id", deserialize_with = "wire::falsy_option")]
    pub variant_id: Option<VariantId>,
    #[serde(default, deserialize_with = "wire::falsy_option")]
    pub display_name: Option<String>,
    #[serde(default, rename = "description_sale", deserialize_with = "wire::falsy_option")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionalProductsRequest {
    pub product_template_id: TemplateId,
    pub combination: Vec<ValueId>,
    pub parent_combination: Vec<ValueId>,
    pub currency_id: Option<CurrencyId>,
    pub so_date: Option<NaiveDate>,
    pub company_id: Option<CompanyId>,
    pub pricelist_id: Option<PricelistId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "wire::falsy_option")]
    pub error: Option<String>,
}

/// Attribute flags the configurator payload does not carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMetadata {
    pub id: AttributeId,
    #[serde(default)]
    pub is_width_check: bool,
    #[serde(default)]
    pub pair_with_previous: bool,
    #[serde(default)]
    pub is_quantity: bool,
    #[serde(default)]
    pub is_gelcoat_required_flag: bool,
    /// Technical name of the model behind a linked-record attribute.
    #[serde(default, deserialize_with = "wire::falsy_option")]
    pub linked_model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueFlags {
    pub id: ValueId,
    #[serde(default)]
    pub is_opaque: bool,
    #[serde(default)]
    pub is_translucent: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRecordFlags {
    pub id: LinkedRecordId,
    #[serde(default)]
    pub is_opaque: bool,
    #[serde(default)]
    pub is_translucent: bool,
}

/// Remote collaborator of a configuration session: pricing, variant
/// creation, optional products, persistence and metadata reads.
#[async_trait]
pub trait ConfiguratorBackend: Send + Sync {
    async fn get_values(&self, request: &LoadRequest) -> Result<LoadResponse, BackendError>;

    async fn create_variant(
        &self,
        template_id: TemplateId,
        combination: &[ValueId],
    ) -> Result<VariantId, BackendError>;

    async fn update_combination(
        &self,
        request: &CombinationRequest,
    ) -> Result<CombinationUpdate, BackendError>;

    async fn get_optional_products(
        &self,
        request: &OptionalProductsRequest,
    ) -> Result<Vec<ProductNode>, BackendError>;

    async fn save(&self, payload: &SubmissionPayload) -> Result<SaveResponse, BackendError>;

    async fn read_attribute_metadata(
        &self,
        attribute_ids: &[AttributeId],
    ) -> Result<Vec<AttributeMetadata>, BackendError>;

    async fn read_value_flags(&self, value_ids: &[ValueId]) -> Result<Vec<ValueFlags>, BackendError>;

    async fn read_linked_record_flags(
        &self,
        model: &str,
        record_ids: &[LinkedRecordId],
    ) -> Result<Vec<LinkedRecordFlags>, BackendError>;
}

/// Serves a recorded `get_values` snapshot and refuses every other call.
///
/// Metadata reads answer empty so enrichment is a no-op.
#[derive(Clone, Debug, Default)]
pub struct OfflineBackend {
    snapshot: LoadResponse,
}

impl OfflineBackend {
    pub fn new(snapshot: LoadResponse) -> Self {
        Self { snapshot }
    }

    fn unavailable(route: &str) -> BackendError {
        BackendError::Transport(format!("`{route}` is not available offline"))
    }
}

#[async_trait]
impl ConfiguratorBackend for OfflineBackend {
    async fn get_values(&self, _request: &LoadRequest) -> Result<LoadResponse, BackendError> {
        Ok(self.snapshot.clone())
    }

    async fn create_variant(
        &self,
        _template_id: TemplateId,
        _combination: &[ValueId],
    ) -> Result<VariantId, BackendError> {
        Err(Self::unavailable("create_product"))
    }

    async fn update_combination(
        &self,
        _request: &CombinationRequest,
    ) -> Result<CombinationUpdate, BackendError> {
        Err(Self::unavailable("update_combination"))
    }

    async fn get_optional_products(
        &self,
        _request: &OptionalProductsRequest,
    ) -> Result<Vec<ProductNode>, BackendError> {
        Err(Self::unavailable("get_optional_products"))
    }

    async fn save(&self, _payload: &SubmissionPayload) -> Result<SaveResponse, BackendError> {
        Err(Self::unavailable("save_to_crm"))
    }

    async fn read_attribute_metadata(
        &self,
        _attribute_ids: &[AttributeId],
    ) -> Result<Vec<AttributeMetadata>, BackendError> {
        Ok(Vec::new())
    }

    async fn read_value_flags(&self, _value_ids: &[ValueId]) -> Result<Vec<ValueFlags>, BackendError> {
        Ok(Vec::new())
    }

    async fn read_linked_record_flags(
        &self,
        _model: &str,
        _record_ids: &[LinkedRecordId],
    ) -> Result<Vec<LinkedRecordFlags>, BackendError> {
        Ok(Vec::new())
    }
}
