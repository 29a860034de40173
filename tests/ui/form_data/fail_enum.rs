#[derive(formwork::form::FormData)]
enum Contact {
    Email(String),
    Phone(String),
}

fn main() {}
