#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid identifier for {entity}: {value}")]
    InvalidId { entity: &'static str, value: String },
}
