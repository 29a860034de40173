mod channels;
mod controller;
mod data;
mod display;
mod errors;
mod field;
mod transport;
mod validation;


pub use channels::{FieldErrorChannels, FormNotice};
pub use controller::{
    BoxedFormValidation, FieldMeta, FormController, FormDefinition, FormError, FormId,
    FormResult, FormSnapshot, SubmitLock, SubmitOutcome,
};
pub use data::{FieldType, FormData, read_field};
pub use display::{ErrorDisplay, Localize, VALIDATION_PREFIX, render, render_notices};
pub use errors::{ErrorParams, ErrorSet, FieldError, params};
pub use field::{Field, FieldGroup, FieldKey, FieldNode, FieldSpec, FieldSpecs, FieldValue, FormValues};
pub use transport::{
    BoxedTransportFuture, BusinessError, BusinessErrorParam, Method, SubmitFailure,
    SubmitTransport, TransportError, TransportResult,
};
pub use validation::{
    CrossFieldCheck, CrossFieldValidator, CrossFieldValidators, MatchFields, MaxLength, MinLength,
    Pattern, Required, Rule, RuleViolation,
};
