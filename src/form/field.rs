use std::borrow::{Borrow, Cow};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

use super::errors::ErrorSet;
use super::validation::Rule;

/// Name of a field inside its group, or a dotted path to a nested field.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Cow<'static, str>);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.').filter(|segment| !segment.is_empty())
    }

    pub fn join(&self, child: &FieldKey) -> FieldKey {
        if self.0.is_empty() {
            return child.clone();
        }
        FieldKey(Cow::Owned(format!("{}.{}", self.0, child.0)))
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for FieldKey {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&FieldKey> for FieldKey {
    fn from(value: &FieldKey) -> Self {
        value.clone()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(Decimal),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Number(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Length used by the length rules: characters for text, items for lists.
    pub fn len(&self) -> Option<usize> {
        match self {
            FieldValue::Text(text) => Some(text.chars().count()),
            FieldValue::List(items) => Some(items.len()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(value) => Value::Bool(*value),
            FieldValue::Number(value) => value
                .to_string()
                .parse::<Number>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::String(value.to_string())),
            FieldValue::Text(value) => Value::String(value.clone()),
            FieldValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Number(value)
    }
}

/// Flat, ordered view of field values keyed by dotted path.
pub type FormValues = IndexMap<FieldKey, FieldValue>;

/// Declaration of one node of the field tree.
#[derive(Clone)]
pub enum FieldSpec {
    Control {
        initial: FieldValue,
        rules: Vec<Arc<dyn Rule>>,
    },
    Group(FieldSpecs),
}

impl FieldSpec {
    pub fn control(initial: impl Into<FieldValue>) -> Self {
        FieldSpec::Control {
            initial: initial.into(),
            rules: Vec::new(),
        }
    }

    pub fn group(specs: FieldSpecs) -> Self {
        FieldSpec::Group(specs)
    }

    /// Adds a rule to a control. Rules on a group spec are ignored.
    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        if let FieldSpec::Control { rules, .. } = &mut self {
            rules.push(Arc::new(rule));
        }
        self
    }
}

#[derive(Clone, Default)]
pub struct FieldSpecs {
    entries: IndexMap<FieldKey, FieldSpec>,
}

impl FieldSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<FieldKey>, spec: FieldSpec) -> Self {
        self.entries.insert(key.into(), spec);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone)]
pub struct Field {
    pub(super) initial: FieldValue,
    pub(super) value: FieldValue,
    pub(super) rules: Vec<Arc<dyn Rule>>,
    pub(super) errors: ErrorSet,
    pub(super) touched: bool,
    pub(super) dirty: bool,
}

impl Field {
    fn new(initial: FieldValue, rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            value: initial.clone(),
            initial,
            rules,
            errors: ErrorSet::new(),
            touched: false,
            dirty: false,
        }
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn initial(&self) -> &FieldValue {
        &self.initial
    }

    pub fn errors(&self) -> &ErrorSet {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(super) fn set_value(&mut self, value: FieldValue) {
        self.value = value;
        self.dirty = self.value != self.initial;
    }

    /// Re-runs the field's own rules, replacing the error set.
    pub(super) fn run_rules(&mut self) {
        let mut errors = ErrorSet::new();
        for rule in &self.rules {
            if let Some(violation) = rule.check(&self.value) {
                errors.add(violation.code, violation.params);
            }
        }
        self.errors = errors;
    }

    /// Replaces both the initial and current value, leaving the field pristine.
    pub(super) fn load(&mut self, value: FieldValue) {
        self.initial = value.clone();
        self.value = value;
        self.dirty = false;
    }

    pub(super) fn reset(&mut self) {
        self.value = self.initial.clone();
        self.touched = false;
        self.dirty = false;
    }
}

#[derive(Clone)]
pub enum FieldNode {
    Control(Field),
    Group(FieldGroup),
}

#[derive(Clone, Default)]
pub struct FieldGroup {
    entries: IndexMap<FieldKey, FieldNode>,
}

impl FieldGroup {
    pub fn from_specs(specs: &FieldSpecs) -> Self {
        let entries = specs
            .entries
            .iter()
            .map(|(key, spec)| {
                let node = match spec {
                    FieldSpec::Control { initial, rules } => {
                        FieldNode::Control(Field::new(initial.clone(), rules.clone()))
                    }
                    FieldSpec::Group(children) => FieldNode::Group(Self::from_specs(children)),
                };
                (key.clone(), node)
            })
            .collect();
        Self { entries }
    }

    pub fn node(&self, path: &FieldKey) -> Option<&FieldNode> {
        let mut segments = path.segments();
        let mut node = self.entries.get(segments.next()?)?;
        for segment in segments {
            match node {
                FieldNode::Group(group) => node = group.entries.get(segment)?,
                FieldNode::Control(_) => return None,
            }
        }
        Some(node)
    }

    pub fn node_mut(&mut self, path: &FieldKey) -> Option<&mut FieldNode> {
        let mut segments = path.segments();
        let mut node = self.entries.get_mut(segments.next()?)?;
        for segment in segments {
            match node {
                FieldNode::Group(group) => node = group.entries.get_mut(segment)?,
                FieldNode::Control(_) => return None,
            }
        }
        Some(node)
    }

    pub fn field(&self, path: impl Into<FieldKey>) -> Option<&Field> {
        match self.node(&path.into())? {
            FieldNode::Control(field) => Some(field),
            FieldNode::Group(_) => None,
        }
    }

    pub fn field_mut(&mut self, path: impl Into<FieldKey>) -> Option<&mut Field> {
        match self.node_mut(&path.into())? {
            FieldNode::Control(field) => Some(field),
            FieldNode::Group(_) => None,
        }
    }

    /// Stores a value without validating it. Returns `false` for unknown paths.
    pub fn set_value(&mut self, path: impl Into<FieldKey>, value: impl Into<FieldValue>) -> bool {
        match self.field_mut(path) {
            Some(field) => {
                field.set_value(value.into());
                true
            }
            None => false,
        }
    }

    /// Text value of a field, or `""` when the field is missing or not text.
    pub fn text(&self, path: impl Into<FieldKey>) -> &str {
        self.field(path)
            .and_then(|field| field.value.as_text())
            .unwrap_or_default()
    }

    /// Visits every leaf field, depth first, with its full path.
    pub fn visit(&self, f: &mut impl FnMut(&FieldKey, &Field)) {
        self.visit_at(&FieldKey::from(String::new()), f);
    }

    fn visit_at(&self, prefix: &FieldKey, f: &mut impl FnMut(&FieldKey, &Field)) {
        for (key, node) in &self.entries {
            let path = prefix.join(key);
            match node {
                FieldNode::Control(field) => f(&path, field),
                FieldNode::Group(group) => group.visit_at(&path, f),
            }
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&FieldKey, &mut Field)) {
        self.visit_mut_at(&FieldKey::from(String::new()), f);
    }

    fn visit_mut_at(&mut self, prefix: &FieldKey, f: &mut impl FnMut(&FieldKey, &mut Field)) {
        for (key, node) in &mut self.entries {
            let path = prefix.join(key);
            match node {
                FieldNode::Control(field) => f(&path, field),
                FieldNode::Group(group) => group.visit_mut_at(&path, f),
            }
        }
    }

    pub fn paths(&self) -> Vec<FieldKey> {
        let mut paths = Vec::new();
        self.visit(&mut |path, _| paths.push(path.clone()));
        paths
    }

    pub fn values(&self) -> FormValues {
        let mut values = FormValues::new();
        self.visit(&mut |path, field| {
            values.insert(path.clone(), field.value.clone());
        });
        values
    }

    pub fn is_valid(&self) -> bool {
        let mut valid = true;
        self.visit(&mut |_, field| valid &= field.is_valid());
        valid
    }

    pub fn is_dirty(&self) -> bool {
        let mut dirty = false;
        self.visit(&mut |_, field| dirty |= field.dirty);
        dirty
    }

    /// Request body: groups become nested JSON objects.
    pub fn to_json(&self) -> Value {
        let object = self
            .entries
            .iter()
            .map(|(key, node)| {
                let value = match node {
                    FieldNode::Control(field) => field.value.to_json(),
                    FieldNode::Group(group) => group.to_json(),
                };
                (key.as_str().to_string(), value)
            })
            .collect::<Map<String, Value>>();
        Value::Object(object)
    }
}

/// Applies `f` to the field at `path`, or to every field below it when the
/// path names a group. Returns `false` when nothing lives at `path`.
pub(super) fn apply_at(
    group: &mut FieldGroup,
    path: &FieldKey,
    f: &mut impl FnMut(&FieldKey, &mut Field),
) -> bool {
    match group.node_mut(path) {
        Some(FieldNode::Control(field)) => {
            f(path, field);
            true
        }
        Some(FieldNode::Group(child)) => {
            child.visit_mut_at(path, f);
            true
        }
        None => false,
    }
}
