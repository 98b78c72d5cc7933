pub mod engine;
pub mod filters;
pub mod history;
pub mod persistence;
pub mod scheduler;
pub mod strategy;

pub use engine::StrategyEngine;
pub use persistence::JsonFileHistory;

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    use crate::api::{TokenListQuery, TokenListResponse, TokenListSource};
    use crate::error::GemHunterError;
    use crate::models::TokenPayload;

    enum Reply {
        Tokens(Vec<TokenPayload>),
        Unsuccessful,
        Error,
    }

    /// Token list source that plays back queued replies. An empty queue answers
    /// with an empty successful list.
    #[derive(Default)]
    pub struct ScriptedSource {
        replies: Mutex<VecDeque<Reply>>,
        queries: Mutex<Vec<TokenListQuery>>,
    }

    impl ScriptedSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn push_tokens(&self, tokens: Vec<TokenPayload>) {
            self.replies.lock().await.push_back(Reply::Tokens(tokens));
        }

        pub async fn push_unsuccessful(&self) {
            self.replies.lock().await.push_back(Reply::Unsuccessful);
        }

        pub async fn push_error(&self) {
            self.replies.lock().await.push_back(Reply::Error);
        }

        pub async fn queries(&self) -> Vec<TokenListQuery> {
            self.queries.lock().await.clone()
        }
    }

    #[async_trait]
    impl TokenListSource for ScriptedSource {
        async fn get_token_list(&self, query: &TokenListQuery) -> Result<TokenListResponse, GemHunterError> {
            self.queries.lock().await.push(query.clone());
            match self.replies.lock().await.pop_front() {
                Some(Reply::Tokens(tokens)) => Ok(TokenListResponse::ok(tokens)),
                Some(Reply::Unsuccessful) => Ok(TokenListResponse::failed()),
                Some(Reply::Error) => Err(GemHunterError::ApiError("connection reset".to_string())),
                None => Ok(TokenListResponse::ok(Vec::new())),
            }
        }
    }

    pub fn token(address: &str) -> TokenPayload {
        TokenPayload {
            address: address.to_string(),
            symbol: Some(address.to_uppercase()),
            ..Default::default()
        }
    }
}
