#[derive(formwork::form::FormData)]
struct Email(String);

fn main() {}
