use indexmap::IndexMap;

/// Named parameters interpolated into an error's localized message.
pub type ErrorParams = IndexMap<String, String>;

/// Error codes currently present on a field, each with its parameters.
///
/// Merging is per code: adding a code never disturbs the others, removing one
/// strips only that code. An empty set means the field has no error.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorSet {
    entries: IndexMap<String, ErrorParams>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(code: impl Into<String>, params: ErrorParams) -> Self {
        let mut set = Self::new();
        set.add(code, params);
        set
    }

    /// Adds `code` unless already present. Returns whether the set changed.
    pub fn add(&mut self, code: impl Into<String>, params: ErrorParams) -> bool {
        let code = code.into();
        if self.entries.contains_key(&code) {
            return false;
        }
        self.entries.insert(code, params);
        true
    }

    /// Stores `code` with `params`, overwriting the params of an existing
    /// entry in place. Other codes are untouched.
    pub fn set(&mut self, code: impl Into<String>, params: ErrorParams) -> bool {
        let code = code.into();
        if self.entries.get(&code) == Some(&params) {
            return false;
        }
        self.entries.insert(code, params);
        true
    }

    /// Removes `code`. Returns whether the set changed.
    pub fn remove(&mut self, code: &str) -> bool {
        self.entries.shift_remove(code).is_some()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn params(&self, code: &str) -> Option<&ErrorParams> {
        self.entries.get(code)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ErrorParams)> {
        self.entries
            .iter()
            .map(|(code, params)| (code.as_str(), params))
    }
}

/// Builds [`ErrorParams`] from `(key, value)` pairs.
pub fn params<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> ErrorParams
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// An error injected from outside the validation rules, e.g. a batch check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_other_codes_and_remove_strips_only_one() {
        let mut set = ErrorSet::new();
        assert!(set.add("a", ErrorParams::new()));
        assert!(set.add("b", params([("min", "3")])));
        assert_eq!(set.codes().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(set.remove("a"));
        assert_eq!(set.codes().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(set.params("b").and_then(|p| p.get("min")).map(String::as_str), Some("3"));

        assert!(set.remove("b"));
        assert!(set.is_empty());
    }

    #[test]
    fn adding_an_existing_code_keeps_its_first_params() {
        let mut set = ErrorSet::single("taken", params([("name", "first")]));
        assert!(!set.add("taken", params([("name", "second")])));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.params("taken").and_then(|p| p.get("name")).map(String::as_str),
            Some("first")
        );
    }

    #[test]
    fn set_overwrites_params_in_place() {
        let mut set = ErrorSet::single("blocked", ErrorParams::new());
        assert!(set.set("validation", params([("message", "first")])));
        assert!(set.set("validation", params([("message", "second")])));
        assert!(!set.set("validation", params([("message", "second")])));

        assert_eq!(set.codes().collect::<Vec<_>>(), vec!["blocked", "validation"]);
        assert_eq!(
            set.params("validation").and_then(|p| p.get("message")).map(String::as_str),
            Some("second")
        );
    }

    #[test]
    fn removing_a_missing_code_is_a_no_op() {
        let mut set = ErrorSet::single("a", ErrorParams::new());
        assert!(!set.remove("zzz"));
        assert!(set.contains("a"));
    }
}
