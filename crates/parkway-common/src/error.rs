use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("migration {version} failed: {source}")]
    Migration {
        version: String,
        #[source]
        source: Box<Error>,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("acceptor error: {0}")]
    Acceptor(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Wrap a failure that happened while applying the migration `version`.
    pub fn migration(version: impl Into<String>, source: Error) -> Self {
        Self::Migration {
            version: version.into(),
            source: Box::new(source),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}
