#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Collaborator Error: {0}")]
    Collaborator(String),

    #[error("Divergence Error: total loss is {loss} at iteration {iteration}")]
    Divergence { iteration: u64, loss: f32 },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed Mesh Error: {0}")]
    MalformedMesh(String),

    #[error("Record Error: {0}")]
    Record(#[from] burn::record::RecorderError),

    #[error("Tensor Data Error: {0}")]
    TensorData(String),

    #[error("Validation Error: {0} should be {1}")]
    Validation(String, String),
}
