//! JSON-RPC 2.0 envelopes as the ERP web controllers speak them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub id: u64,
    pub params: &'a P,
}

impl<'a, P> JsonRpcRequest<'a, P> {
    pub fn call(id: u64, params: &'a P) -> Self {
        Self { jsonrpc: "2.0", method: "call", id, params }
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
pub struct JsonRpcResponse<R> {
    #[serde(default)]
    pub result: Option<R>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<ErrorData>,
}

/// Server-side exception details attached to an error envelope.
#[derive(Debug, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JsonRpcError {
    /// The most specific message the server sent.
    pub fn describe(&self) -> String {
        let detail = self.data.as_ref().and_then(|data| data.message.as_deref()).filter(|text| !text.is_empty());
        match (detail, self.data.as_ref().and_then(|data| data.name.as_deref())) {
            (Some(detail), Some(name)) => format!("{detail} ({name})"),
            (Some(detail), None) => detail.to_owned(),
            (None, _) if !self.message.is_empty() => format!("{} (code {})", self.message, self.code),
            (None, _) => format!("json-rpc error code {}", self.code),
        }
    }
}

/// Parameters of a `call_kw` model method.
#[derive(Debug, Serialize)]
pub struct CallKw<'a> {
    pub model: &'a str,
    pub method: &'static str,
    pub args: (Value, &'a [&'static str]),
    pub kwargs: Value,
}

impl<'a> CallKw<'a> {
    pub fn read(model: &'a str, ids: Value, fields: &'a [&'static str]) -> Self {
        Self { model, method: "read", args: (ids, fields), kwargs: Value::Object(Default::default()) }
    }
}

/// Many2one field value: `[id, name]`, a bare id, or `false`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Many2One {
    Reference(i64, Value),
    Id(i64),
    Unset(Value),
}

impl Many2One {
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Reference(id, _) | Self::Id(id) => Some(*id).filter(|id| *id > 0),
            Self::Unset(_) => None,
        }
    }
}

impl Default for Many2One {
    fn default() -> Self {
        Self::Unset(Value::Bool(false))
    }
}
