use std::borrow::Cow;
use stowage_derive::stowage_error;

#[stowage_error]
pub enum DemoError {
    #[error("IO error{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Integrity failure{}: {message}", format_context(.context))]
    Integrity { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn main() {
    let from_io: DemoError = std::io::Error::other("disk").into();
    let from_str: DemoError = "oops".into();
    let _ = (from_io, from_str);
}
