use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use configurator_core::config::BackendConfig;
use configurator_core::configurator::backend::{
    AttributeMetadata, CombinationRequest, CombinationUpdate, ConfiguratorBackend, LinkedRecordFlags,
    LoadRequest, LoadResponse, OptionalProductsRequest, SaveResponse, ValueFlags,
};
use configurator_core::configurator::SubmissionPayload;
use configurator_core::domain::ids::{AttributeId, LinkedRecordId, TemplateId, ValueId, VariantId};
use configurator_core::domain::product::ProductNode;
use configurator_core::errors::BackendError;
use reqwest::header::COOKIE;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::envelope::{CallKw, JsonRpcRequest, JsonRpcResponse, Many2One};

const GET_VALUES: &str = "/crm_product_configurator/get_values";
const CREATE_PRODUCT: &str = "/crm_product_configurator/create_product";
const UPDATE_COMBINATION: &str = "/crm_product_configurator/update_combination";
const GET_OPTIONAL_PRODUCTS: &str = "/crm_product_configurator/get_optional_products";
const SAVE_TO_CRM: &str = "/crm_product_configurator/save_to_crm";

const ATTRIBUTE_MODEL: &str = "product.attribute";
const ATTRIBUTE_VALUE_MODEL: &str = "product.attribute.value";
const MODEL_REGISTRY: &str = "ir.model";

const ATTRIBUTE_FIELDS: &[&str] =
    &["is_width_check", "m2o_model_id", "pair_with_previous", "is_quantity", "is_gelcoat_required_flag"];
const FLAG_FIELDS: &[&str] = &["is_opaque", "is_translucent"];

/// Header naming the database on multi-database servers.
pub const DATABASE_HEADER: &str = "X-Odoo-Database";

/// Configurator backend reached over the ERP's JSON-RPC web routes.
pub struct JsonRpcBackend {
    client: Client,
    base_url: String,
    database: Option<String>,
    session_token: Option<SecretString>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for JsonRpcBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcBackend")
            .field("base_url", &self.base_url)
            .field("database", &self.database)
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Serialize)]
struct CreateProductParams<'a> {
    product_template_id: TemplateId,
    combination: &'a [ValueId],
}

#[derive(Deserialize)]
struct AttributeRecord {
    id: AttributeId,
    #[serde(default)]
    is_width_check: bool,
    #[serde(default)]
    m2o_model_id: Many2One,
    #[serde(default)]
    pair_with_previous: bool,
    #[serde(default)]
    is_quantity: bool,
    #[serde(default)]
    is_gelcoat_required_flag: bool,
}

#[derive(Deserialize)]
struct ModelRecord {
    id: i64,
    model: String,
}

impl JsonRpcBackend {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            database: None,
            session_token: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| BackendError::Transport(format!("could not build http client: {error}")))?;

        let mut backend = Self::new(client, config.base_url.clone());
        backend.database = config.database.clone();
        backend.session_token = config.session_token.clone();
        Ok(backend)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_session_token(mut self, token: SecretString) -> Self {
        self.session_token = Some(token);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<P, R>(&self, route: &str, params: &P) -> Result<R, BackendError>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = self.client.post(format!("{}{route}", self.base_url)).json(&JsonRpcRequest::call(id, params));
        if let Some(database) = &self.database {
            request = request.header(DATABASE_HEADER, database);
        }
        if let Some(token) = &self.session_token {
            request = request.header(COOKIE, format!("session_id={}", token.expose_secret()));
        }

        debug!(event_name = "configurator.rpc.request", route, request_id = id, "sending json-rpc call");
        let response = request.send().await.map_err(|error| {
            warn!(event_name = "configurator.rpc.transport_failed", route, error = %error, "json-rpc call failed");
            BackendError::Transport(format!("{route}: {error}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(event_name = "configurator.rpc.http_status", route, status = %status, "json-rpc call rejected");
            return Err(BackendError::Transport(format!("{route}: http status {status}")));
        }

        let envelope: JsonRpcResponse<R> = response.json().await.map_err(|error| BackendError::Decode {
            route: route.to_owned(),
            message: error.to_string(),
        })?;

        if let Some(error) = envelope.error {
            let message = error.describe();
            warn!(event_name = "configurator.rpc.remote_error", route, error = %message, "json-rpc call returned an error");
            return Err(BackendError::Remote { route: route.to_owned(), message });
        }
        envelope.result.ok_or_else(|| BackendError::Decode {
            route: route.to_owned(),
            message: "response carried neither result nor error".to_owned(),
        })
    }

    async fn read<I, R>(&self, model: &str, ids: &[I], fields: &[&'static str]) -> Result<Vec<R>, BackendError>
    where
        I: Serialize + Sync,
        R: DeserializeOwned,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let route = format!("/web/dataset/call_kw/{model}/read");
        let ids = serde_json::to_value(ids).map_err(|error| BackendError::Decode {
            route: route.clone(),
            message: format!("could not encode record ids: {error}"),
        })?;
        self.call(&route, &CallKw::read(model, ids, fields)).await
    }

    /// Maps `ir.model` ids to technical model names.
    async fn resolve_models(&self, model_ids: Vec<i64>) -> Result<BTreeMap<i64, String>, BackendError> {
        let records: Vec<ModelRecord> = self.read(MODEL_REGISTRY, &model_ids, &["model"]).await?;
        Ok(records.into_iter().map(|record| (record.id, record.model)).collect())
    }
}

#[async_trait]
impl ConfiguratorBackend for JsonRpcBackend {
    async fn get_values(&self, request: &LoadRequest) -> Result<LoadResponse, BackendError> {
        self.call(GET_VALUES, request).await
    }

    async fn create_variant(
        &self,
        template_id: TemplateId,
        combination: &[ValueId],
    ) -> Result<VariantId, BackendError> {
        let params = CreateProductParams { product_template_id: template_id, combination };
        let variant_id: VariantId = self.call(CREATE_PRODUCT, &params).await?;
        if !variant_id.is_valid() {
            return Err(BackendError::Decode {
                route: CREATE_PRODUCT.to_owned(),
                message: format!("invalid variant id {variant_id}"),
            });
        }
        Ok(variant_id)
    }

    async fn update_combination(
        &self,
        request: &CombinationRequest,
    ) -> Result<CombinationUpdate, BackendError> {
        self.call(UPDATE_COMBINATION, request).await
    }

    async fn get_optional_products(
        &self,
        request: &OptionalProductsRequest,
    ) -> Result<Vec<ProductNode>, BackendError> {
        self.call(GET_OPTIONAL_PRODUCTS, request).await
    }

    async fn save(&self, payload: &SubmissionPayload) -> Result<SaveResponse, BackendError> {
        self.call(SAVE_TO_CRM, payload).await
    }

    async fn read_attribute_metadata(
        &self,
        attribute_ids: &[AttributeId],
    ) -> Result<Vec<AttributeMetadata>, BackendError> {
        let records: Vec<AttributeRecord> = self.read(ATTRIBUTE_MODEL, attribute_ids, ATTRIBUTE_FIELDS).await?;

        let mut model_ids = records.iter().filter_map(|record| record.m2o_model_id.id()).collect::<Vec<_>>();
        model_ids.sort_unstable();
        model_ids.dedup();
        let models = self.resolve_models(model_ids).await?;

        Ok(records
            .into_iter()
            .map(|record| AttributeMetadata {
                id: record.id,
                is_width_check: record.is_width_check,
                pair_with_previous: record.pair_with_previous,
                is_quantity: record.is_quantity,
                is_gelcoat_required_flag: record.is_gelcoat_required_flag,
                linked_model: record.m2o_model_id.id().and_then(|model_id| models.get(&model_id).cloned()),
            })
            .collect())
    }

    async fn read_value_flags(&self, value_ids: &[ValueId]) -> Result<Vec<ValueFlags>, BackendError> {
        self.read(ATTRIBUTE_VALUE_MODEL, value_ids, FLAG_FIELDS).await
    }

    async fn read_linked_record_flags(
        &self,
        model: &str,
        record_ids: &[LinkedRecordId],
    ) -> Result<Vec<LinkedRecordFlags>, BackendError> {
        self.read(model, record_ids, FLAG_FIELDS).await
    }
}
