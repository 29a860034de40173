#[derive(formwork::form::FormData)]
struct Wrapper<T> {
    value: T,
}

fn main() {}
