//! 4.F Request Translator and 4.G Response Translator.

pub mod request;
pub mod response;

pub use request::{build, BuiltRequest, TranslateError};
pub use response::{to_unary_response, ResponseStream};
