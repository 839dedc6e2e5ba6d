//! Core value and request types.

pub mod params;
mod request;
mod value;

pub use request::RequestContext;
pub use value::{DATE_FORMAT, TIME_FORMAT, Value};
