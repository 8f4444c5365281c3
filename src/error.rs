use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolarwayError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("No suitable mesh available")]
    NoCoverage,

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Vehicle '{0}' already exists; set force_properties to overwrite")]
    VehicleExists(String),

    #[error("Invalid vehicle definition: {0}")]
    InvalidVehicle(String),

    #[error("Invalid mesh file: {0}")]
    InvalidMesh(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PolarwayError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolarwayError>;
