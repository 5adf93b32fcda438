#[derive(thiserror::Error, Debug)]
pub enum Ti1Error {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Scan error: {0}")]
    Scan(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Ti1Error>;
