use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Problem originated from the database library
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The requested tag id does not exist
    #[error("tag {0} not found")]
    TagNotFound(i32),
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TagNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
