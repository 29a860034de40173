use regex::Regex;

use super::errors::{ErrorParams, params};
use super::field::{FieldGroup, FieldKey, FieldValue};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleViolation {
    pub code: String,
    pub params: ErrorParams,
}

impl RuleViolation {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            params: ErrorParams::new(),
        }
    }

    pub fn with_params(code: impl Into<String>, params: ErrorParams) -> Self {
        Self {
            code: code.into(),
            params,
        }
    }
}

/// A synchronous check on a single field's value.
pub trait Rule: Send + Sync {
    fn check(&self, value: &FieldValue) -> Option<RuleViolation>;
}

impl<F> Rule for F
where
    F: Fn(&FieldValue) -> Option<RuleViolation> + Send + Sync,
{
    fn check(&self, value: &FieldValue) -> Option<RuleViolation> {
        (self)(value)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Required;

impl Rule for Required {
    fn check(&self, value: &FieldValue) -> Option<RuleViolation> {
        value.is_empty().then(|| RuleViolation::new("required"))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MinLength(pub usize);

impl Rule for MinLength {
    fn check(&self, value: &FieldValue) -> Option<RuleViolation> {
        if value.is_empty() {
            return None;
        }
        let actual = value.len()?;
        (actual < self.0).then(|| {
            RuleViolation::with_params(
                "minLength",
                params([
                    ("requiredLength", self.0.to_string()),
                    ("actualLength", actual.to_string()),
                ]),
            )
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MaxLength(pub usize);

impl Rule for MaxLength {
    fn check(&self, value: &FieldValue) -> Option<RuleViolation> {
        let actual = value.len()?;
        (actual > self.0).then(|| {
            RuleViolation::with_params(
                "maxLength",
                params([
                    ("requiredLength", self.0.to_string()),
                    ("actualLength", actual.to_string()),
                ]),
            )
        })
    }
}

/// Whole-value regular expression match on text fields. Empty values pass.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{pattern})$"))?,
        })
    }
}

impl Rule for Pattern {
    fn check(&self, value: &FieldValue) -> Option<RuleViolation> {
        let text = value.as_text().filter(|text| !text.is_empty())?;
        (!self.regex.is_match(text)).then(|| {
            RuleViolation::with_params(
                "pattern",
                params([
                    ("requiredPattern", self.source.as_str()),
                    ("actualValue", text),
                ]),
            )
        })
    }
}

/// Result of one cross-field check. A passing check clears its code from
/// every target, a failing one adds it. No targets means a form-level error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CrossFieldCheck {
    pub code: String,
    pub fields: Vec<FieldKey>,
    pub failed: bool,
}

impl CrossFieldCheck {
    pub fn new(code: impl Into<String>, fields: Vec<FieldKey>, failed: bool) -> Self {
        Self {
            code: code.into(),
            fields,
            failed,
        }
    }
}

/// Validation spanning several fields, re-run after every validity pass.
/// Must be a pure function of the field tree.
pub trait CrossFieldValidator: Send + Sync {
    fn validate(&self, fields: &FieldGroup) -> Vec<CrossFieldCheck>;
}

impl<F> CrossFieldValidator for F
where
    F: Fn(&FieldGroup) -> Vec<CrossFieldCheck> + Send + Sync,
{
    fn validate(&self, fields: &FieldGroup) -> Vec<CrossFieldCheck> {
        (self)(fields)
    }
}

/// Requires two fields to hold equal values, flagging both on mismatch.
#[derive(Clone, Debug)]
pub struct MatchFields {
    code: String,
    first: FieldKey,
    second: FieldKey,
}

impl MatchFields {
    pub fn new(
        code: impl Into<String>,
        first: impl Into<FieldKey>,
        second: impl Into<FieldKey>,
    ) -> Self {
        Self {
            code: code.into(),
            first: first.into(),
            second: second.into(),
        }
    }
}

impl CrossFieldValidator for MatchFields {
    fn validate(&self, fields: &FieldGroup) -> Vec<CrossFieldCheck> {
        let first = fields.field(&self.first).map(|field| field.value());
        let second = fields.field(&self.second).map(|field| field.value());
        vec![CrossFieldCheck::new(
            self.code.clone(),
            vec![self.first.clone(), self.second.clone()],
            first != second,
        )]
    }
}

/// Runs several cross-field validators as one.
#[derive(Default)]
pub struct CrossFieldValidators(Vec<Box<dyn CrossFieldValidator>>);

impl CrossFieldValidators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, validator: impl CrossFieldValidator + 'static) -> Self {
        self.0.push(Box::new(validator));
        self
    }
}

impl CrossFieldValidator for CrossFieldValidators {
    fn validate(&self, fields: &FieldGroup) -> Vec<CrossFieldCheck> {
        self.0
            .iter()
            .flat_map(|validator| validator.validate(fields))
            .collect()
    }
}
