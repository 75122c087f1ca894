use serde_json::Value;
use service_core::error::AppError;
use thiserror::Error;

/// Fields every notification request must carry, in reporting order.
pub const REQUIRED_FIELDS: [&str; 3] = ["name", "email", "phone"];

/// A newly registered user as submitted to `POST /notify`.
///
/// Values are taken verbatim; only presence is enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Se requiere un cuerpo JSON válido")]
    InvalidBody,

    #[error("Campo requerido faltante: {0}")]
    MissingField(&'static str),

    #[error("Campo inválido: {0}")]
    InvalidField(&'static str),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl Registration {
    /// Parse a raw request body.
    ///
    /// The body must be a JSON object. A `null` value counts as missing.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| ValidationError::InvalidBody)?;
        let object = value.as_object().ok_or(ValidationError::InvalidBody)?;

        let field = |name: &'static str| match object.get(name) {
            None | Some(Value::Null) => Err(ValidationError::MissingField(name)),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(ValidationError::InvalidField(name)),
        };

        let [name, email, phone] = REQUIRED_FIELDS;
        Ok(Self {
            name: field(name)?,
            email: field(email)?,
            phone: field(phone)?,
        })
    }
}
