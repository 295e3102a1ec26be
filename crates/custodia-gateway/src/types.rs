//! Wire response shape (spec §6): every mutation returns
//! `{success, data?, errors?, sagaId?}`.

use custodia_core::error::CustodiaError;
use custodia_core::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(rename = "sagaId", skip_serializing_if = "Option::is_none")]
    pub saga_id: Option<String>,
}

impl ExecuteResponse {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), errors: None, saga_id: None }
    }

    pub fn ok_with_saga(data: Value, saga_id: impl Into<String>) -> Self {
        Self { success: true, data: Some(data), errors: None, saga_id: Some(saga_id.into()) }
    }

    pub fn err(error: CustodiaError) -> Self {
        Self { success: false, data: None, errors: Some(vec![error.to_string()]), saga_id: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_omits_errors_and_saga_id_when_serialized() {
        let resp = ExecuteResponse::ok(Value::Null);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], serde_json::json!(true));
        assert!(json.get("errors").is_none());
        assert!(json.get("sagaId").is_none());
    }

    #[test]
    fn err_response_carries_the_message() {
        let resp = ExecuteResponse::err(CustodiaError::InvalidCredentials);
        assert!(!resp.success);
        assert_eq!(resp.errors.unwrap().len(), 1);
    }
}
