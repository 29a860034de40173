use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::errors::{ErrorParams, ErrorSet};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a [`SubmitTransport`]. `payload` carries the decoded
/// response body when the server sent one.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportError {
    pub status: Option<u16>,
    pub message: String,
    pub payload: Option<Value>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "request failed with status {status}: {}", self.message),
            None => write!(f, "request failed: {}", self.message),
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult = Result<Value, TransportError>;

pub type BoxedTransportFuture<'a> = Pin<Box<dyn Future<Output = TransportResult> + Send + 'a>>;

/// HTTP-like request function the controller submits through.
pub trait SubmitTransport: Send + Sync {
    fn send<'a>(&'a self, method: Method, address: &'a str, body: Value)
    -> BoxedTransportFuture<'a>;
}

impl<F> SubmitTransport for F
where
    F: for<'a> Fn(Method, &'a str, Value) -> BoxedTransportFuture<'a> + Send + Sync,
{
    fn send<'a>(
        &'a self,
        method: Method,
        address: &'a str,
        body: Value,
    ) -> BoxedTransportFuture<'a> {
        (self)(method, address, body)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct BusinessErrorParam {
    pub key: String,
    /// Non-string values arrive as their JSON text; `null` becomes empty.
    #[serde(default, deserialize_with = "arg_value")]
    pub value: String,
}

fn arg_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Structured rejection sent by the server for `errorType == "BUSINESS"`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessError {
    pub error_type: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    pub i18n_key: String,
    #[serde(default)]
    pub args: Vec<BusinessErrorParam>,
}

impl BusinessError {
    pub const ERROR_TYPE: &'static str = "BUSINESS";

    pub fn params(&self) -> ErrorParams {
        self.args
            .iter()
            .map(|arg| (arg.key.clone(), arg.value.clone()))
            .collect()
    }

    pub fn error_set(&self) -> ErrorSet {
        ErrorSet::single(self.i18n_key.clone(), self.params())
    }

    /// Decodes a business error from an error payload, if it has that shape.
    pub fn decode(payload: &Value) -> Option<Self> {
        let error = BusinessError::deserialize(payload).ok()?;
        (error.error_type == Self::ERROR_TYPE).then_some(error)
    }
}

/// Why a submission did not succeed.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitFailure {
    /// Client-side rules rejected the form. Nothing was sent.
    Invalid,
    /// The form's own `validate_form` step returned codes. Nothing was sent.
    Custom(Vec<String>),
    /// The server rejected the submission with a structured payload.
    Business(BusinessError),
    /// Any other transport failure.
    Transport(TransportError),
}

impl SubmitFailure {
    pub fn from_transport(error: TransportError) -> Self {
        match error.payload.as_ref().and_then(BusinessError::decode) {
            Some(business) => SubmitFailure::Business(business),
            None => SubmitFailure::Transport(error),
        }
    }
}

impl Display for SubmitFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitFailure::Invalid => f.write_str("form has validation errors"),
            SubmitFailure::Custom(codes) => {
                write!(f, "form validation failed: {}", codes.join(", "))
            }
            SubmitFailure::Business(error) => match &error.field {
                Some(field) => write!(f, "rejected by server on {field}: {}", error.i18n_key),
                None => write!(f, "rejected by server: {}", error.i18n_key),
            },
            SubmitFailure::Transport(error) => error.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_field_scoped_business_error() {
        let payload = json!({
            "errorType": "BUSINESS",
            "correlationId": "c-1",
            "field": "email",
            "i18nKey": "emailTaken",
            "args": [{"key": "email", "value": "a@b.c"}]
        });
        let error = BusinessError::decode(&payload).expect("business payload");
        assert_eq!(error.field.as_deref(), Some("email"));
        assert_eq!(error.i18n_key, "emailTaken");
        assert_eq!(error.params().get("email").map(String::as_str), Some("a@b.c"));
        assert!(error.error_set().contains("emailTaken"));
    }

    #[test]
    fn keeps_every_arg_as_a_param() {
        let payload = json!({
            "errorType": "BUSINESS",
            "i18nKey": "range",
            "args": [{"key": "min", "value": "1"}, {"key": "max", "value": "9"}]
        });
        let params = BusinessError::decode(&payload).expect("business payload").params();
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn non_string_args_are_kept_as_text() {
        let payload = json!({
            "errorType": "BUSINESS",
            "field": "email",
            "i18nKey": "tooMany",
            "args": [
                {"key": "max", "value": 5},
                {"key": "strict", "value": true},
                {"key": "hint", "value": null}
            ]
        });
        let failure = SubmitFailure::from_transport(
            TransportError::new("conflict").with_payload(payload),
        );
        let SubmitFailure::Business(error) = failure else {
            panic!("expected a business failure, got {failure:?}");
        };
        let params = error.params();
        assert_eq!(params.get("max").map(String::as_str), Some("5"));
        assert_eq!(params.get("strict").map(String::as_str), Some("true"));
        assert_eq!(params.get("hint").map(String::as_str), Some(""));
    }

    #[test]
    fn other_payloads_stay_transport_failures() {
        let technical = TransportError::new("boom")
            .with_status(500)
            .with_payload(json!({"errorType": "TECHNICAL", "i18nKey": "x"}));
        assert!(matches!(
            SubmitFailure::from_transport(technical),
            SubmitFailure::Transport(_)
        ));

        let no_payload = TransportError::new("offline");
        assert!(matches!(
            SubmitFailure::from_transport(no_payload),
            SubmitFailure::Transport(_)
        ));

        let garbage = TransportError::new("bad").with_payload(json!("nope"));
        assert!(matches!(
            SubmitFailure::from_transport(garbage),
            SubmitFailure::Transport(_)
        ));
    }
}
