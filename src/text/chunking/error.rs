//! Error types for document chunking

use std::fmt;

/// Content unit that could not be placed within the token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetUnit {
    /// The context prefix alone
    Context,
    /// Context plus a table header and separator row
    TableHeader,
    /// A single table row in a fresh chunk
    TableRow,
    /// A single token-worth of element content
    Content,
}

impl fmt::Display for BudgetUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BudgetUnit::Context => "context",
            BudgetUnit::TableHeader => "context and table header",
            BudgetUnit::TableRow => "table row",
            BudgetUnit::Content => "element content",
        };
        f.write_str(name)
    }
}

/// Error types for chunking operations
#[derive(thiserror::Error, Debug)]
pub enum ChunkingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Token budget exceeded: {unit} does not fit within {max_tokens} tokens. Consider increasing max tokens per chunk"
    )]
    TokenBudgetExceeded { unit: BudgetUnit, max_tokens: usize },

    #[error("Chunking cancelled")]
    Cancelled,

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),
}

/// Result type for chunking operations
pub type Result<T> = std::result::Result<T, ChunkingError>;

/// Trait for converting tokenizer errors into chunking errors
pub trait IntoChunkingError<T> {
    fn into_chunking_error(self) -> Result<T>;
}

impl<T, E> IntoChunkingError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_chunking_error(self) -> Result<T> {
        self.map_err(|e| ChunkingError::Tokenizer(e.to_string()))
    }
}

impl ChunkingError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn budget_exceeded(unit: BudgetUnit, max_tokens: usize) -> Self {
        Self::TokenBudgetExceeded { unit, max_tokens }
    }

    pub fn tokenizer<S: Into<String>>(msg: S) -> Self {
        Self::Tokenizer(msg.into())
    }

    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Check if retrying the same pass could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            // retrying needs a different budget or configuration
            Self::Configuration(_) | Self::TokenBudgetExceeded { .. } | Self::Validation(_) => {
                false
            }
            Self::Cancelled => false,
            // collaborator failures might be temporary
            Self::Tokenizer(_) | Self::Embedding(_) | Self::Collaborator(_) => true,
        }
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::TokenBudgetExceeded { .. } => "token_budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::Tokenizer(_) => "tokenizer",
            Self::Embedding(_) => "embedding",
            Self::Validation(_) => "validation",
            Self::Collaborator(_) => "collaborator",
        }
    }
}
