pub mod registration;

pub use registration::{Registration, ValidationError};
