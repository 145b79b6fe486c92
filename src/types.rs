use std::fmt;
use std::sync::Arc;

use crate::RequestError;

/// Outcome delivered for one request.
pub type RequestResult = Result<serde_json::Value, RequestError>;

/// Continuation receiving a request outcome.
///
/// It is `Fn` rather than `FnOnce` because a confirmed retry prompt replays
/// the most recent request of each failed endpoint with its original
/// continuation.
pub type Completion = Arc<dyn Fn(RequestResult) + Send + Sync>;

/// One entry of [`RequestCoordinator::batch_request`](crate::RequestCoordinator::batch_request).
#[derive(Clone)]
pub struct BatchRequest {
    pub key: String,
    pub params: serde_json::Value,
    pub on_complete: Option<Completion>,
}

impl BatchRequest {
    pub fn new(key: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            params,
            on_complete: None,
        }
    }

    /// Attaches a continuation invoked alongside the settled result.
    pub fn on_complete(mut self, callback: impl Fn(RequestResult) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchRequest")
            .field("key", &self.key)
            .field("params", &self.params)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

/// Settled state of a batch entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Settled {
    Fulfilled(serde_json::Value),
    Rejected(RequestError),
}

impl Settled {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn into_result(self) -> RequestResult {
        match self {
            Self::Fulfilled(value) => Ok(value),
            Self::Rejected(err) => Err(err),
        }
    }
}

impl From<RequestResult> for Settled {
    fn from(result: RequestResult) -> Self {
        match result {
            Ok(value) => Self::Fulfilled(value),
            Err(err) => Self::Rejected(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{BatchRequest, RequestError, Settled};

    #[test]
    fn settled_from_result() {
        assert!(Settled::from(Ok(json!(1))).is_fulfilled());
        let rejected = Settled::from(Err(RequestError::Abandoned));
        assert!(rejected.is_rejected());
        assert_eq!(rejected.into_result(), Err(RequestError::Abandoned));
    }

    #[test]
    fn batch_request_debug_hides_callback() {
        let request = BatchRequest::new("staffInfo", json!({"id": 3})).on_complete(|_| {});
        let debug = format!("{request:?}");
        assert!(debug.contains("staffInfo"));
        assert!(debug.contains("on_complete: true"));
    }
}
