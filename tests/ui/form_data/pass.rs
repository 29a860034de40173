use formwork::form::{FieldKey, FieldValue, FormData};

#[derive(Clone, Debug, PartialEq, formwork::form::FormData)]
struct Signup {
    email: String,
    #[form(rename = "retypedEmail")]
    email_again: String,
    newsletter: bool,
    age: Option<u32>,
}

fn main() {
    let signup = Signup {
        email: "a@formwork.dev".to_string(),
        email_again: "a@formwork.dev".to_string(),
        newsletter: true,
        age: None,
    };
    let values = signup.to_values();
    let keys = values.keys().map(FieldKey::as_str).collect::<Vec<_>>();
    assert_eq!(keys, ["email", "retypedEmail", "newsletter", "age"]);
    assert_eq!(values.get("age"), Some(&FieldValue::Null));
    assert_eq!(Signup::from_values(&values), Ok(signup));
}
