use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error("store call exceeded {0:?}")]
    StoreTimeout(Duration),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Store failures and timeouts may succeed on a later attempt; validation never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::StoreTimeout(_))
    }
}

pub(crate) async fn within_store_timeout<T, F>(limit: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?limit, "store call timed out");
            Err(EngineError::StoreTimeout(limit))
        }
    }
}

const MAX_LEARNER_ID_LEN: usize = 128;

pub(crate) fn validate_learner_id(learner_id: &str) -> Result<(), EngineError> {
    let trimmed = learner_id.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("learner id must not be empty"));
    }
    if trimmed.len() != learner_id.len() || learner_id.len() > MAX_LEARNER_ID_LEN {
        return Err(EngineError::validation("learner id is malformed"));
    }
    if !learner_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'))
    {
        return Err(EngineError::validation("learner id contains invalid characters"));
    }
    Ok(())
}
