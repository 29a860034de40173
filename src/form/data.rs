use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::controller::{FormError, FormResult};
use super::field::{FieldValue, FormValues};

pub use formwork_derive::FormData;

/// A Rust type stored in a single field.
pub trait FieldType: Sized {
    const EXPECTED: &'static str;

    fn into_field_value(self) -> FieldValue;
    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

/// An entity edited by a form, converted to and from its field values.
/// Usually derived with `#[derive(FormData)]`.
pub trait FormData: Sized {
    fn to_values(&self) -> FormValues;
    fn from_values(values: &FormValues) -> FormResult<Self>;
}

/// Reads one typed value. Missing keys read as [`FieldValue::Null`].
pub fn read_field<T: FieldType>(values: &FormValues, key: &str) -> FormResult<T> {
    let value = values.get(key).unwrap_or(&FieldValue::Null);
    T::from_field_value(value).ok_or_else(|| FormError::FieldType {
        field: key.to_string(),
        expected: T::EXPECTED,
    })
}

impl FieldType for String {
    const EXPECTED: &'static str = "text";

    fn into_field_value(self) -> FieldValue {
        FieldValue::Text(self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Null => Some(String::new()),
            _ => None,
        }
    }
}

impl FieldType for bool {
    const EXPECTED: &'static str = "boolean";

    fn into_field_value(self) -> FieldValue {
        FieldValue::Bool(self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(flag) => Some(*flag),
            FieldValue::Null => Some(false),
            _ => None,
        }
    }
}

impl FieldType for Decimal {
    const EXPECTED: &'static str = "number";

    fn into_field_value(self) -> FieldValue {
        FieldValue::Number(self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Number(number) => Some(*number),
            FieldValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

macro_rules! integer_field_type {
    ($($ty:ty => $to:ident),* $(,)?) => {
        $(
            impl FieldType for $ty {
                const EXPECTED: &'static str = "integer";

                fn into_field_value(self) -> FieldValue {
                    FieldValue::Number(Decimal::from(self))
                }

                fn from_field_value(value: &FieldValue) -> Option<Self> {
                    let number = Decimal::from_field_value(value)?;
                    if !number.fract().is_zero() {
                        return None;
                    }
                    number.$to()
                }
            }
        )*
    };
}

integer_field_type!(i32 => to_i32, i64 => to_i64, u32 => to_u32, u64 => to_u64);

impl<T: FieldType> FieldType for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn into_field_value(self) -> FieldValue {
        self.map_or(FieldValue::Null, FieldType::into_field_value)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            FieldValue::Text(text) if text.is_empty() => Some(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}

impl FieldType for Vec<String> {
    const EXPECTED: &'static str = "text list";

    fn into_field_value(self) -> FieldValue {
        FieldValue::List(self.into_iter().map(FieldValue::Text).collect())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::List(items) => items
                .iter()
                .map(|item| item.as_text().map(str::to_string))
                .collect(),
            FieldValue::Null => Some(Vec::new()),
            _ => None,
        }
    }
}
