use crate::err::engine_error::XtError;

pub mod engine_error;

pub type XResult<T> = Result<T, XtError>;
