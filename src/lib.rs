//! Headless form lifecycle: field trees with rule and cross-field validation,
//! a guarded submit protocol over a pluggable transport, and per-field error
//! channels for whatever renders the form.

pub mod form;
#[cfg(feature = "i18n")]
pub mod i18n;

pub use form::{FormController, FormDefinition, FormError, FormResult};
