//! Method bodies and exception handler tables.

mod body;
mod exceptions;

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
