//! ClientToken deduplication.

use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;

use crate::error::{Ec2Error, Result};
use crate::params::Params;

struct CachedResponse {
    params: Params,
    response: Value,
}

/// Recently applied (action, ClientToken) pairs and their responses.
pub struct IdempotencyCache {
    applied_requests: LruCache<(String, String), CachedResponse>,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl IdempotencyCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            applied_requests: LruCache::new(capacity),
        }
    }

    /// Prior response for a replayed token. A replay carrying different
    /// parameters is rejected.
    pub fn lookup(&mut self, action: &str, token: &str, params: &Params) -> Result<Option<Value>> {
        let key = (action.to_string(), token.to_string());
        let Some(cached) = self.applied_requests.get(&key) else {
            return Ok(None);
        };
        if &cached.params != params {
            return Err(Ec2Error::invalid(
                "IdempotentParameterMismatch",
                format!(
                    "The client token '{}' was already used with different parameters",
                    token
                ),
            ));
        }
        Ok(Some(cached.response.clone()))
    }

    pub fn record(&mut self, action: &str, token: &str, params: &Params, response: &Value) {
        self.applied_requests.put(
            (action.to_string(), token.to_string()),
            CachedResponse {
                params: params.clone(),
                response: response.clone(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.applied_requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied_requests.is_empty()
    }
}
