//! Per-base-URL client cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::{ApiClient, BodyCodec, Chain, Result};

/// Cache of [`ApiClient`]s keyed by base URL.
///
/// Keys are compared as exact strings; callers canonicalize base URLs (with
/// a trailing `/`) before lookup. Entries live as long as the factory.
#[derive(Debug, Default)]
pub struct ClientFactory {
    clients: Mutex<HashMap<String, Arc<ApiClient>>>,
}

impl ClientFactory {
    /// Create an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the client cached for `base_url`, creating it on first use.
    ///
    /// Lookup and creation happen under one lock, so concurrent first uses
    /// of a base URL share a single client.
    ///
    /// # Errors
    ///
    /// Returns an error if a new client cannot be built for `base_url`.
    pub fn get_instance(
        &self,
        chain: &Chain,
        base_url: &str,
        codecs: &[Arc<dyn BodyCodec>],
    ) -> Result<Arc<ApiClient>> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(base_url) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(ApiClient::new(chain.clone(), base_url, codecs.to_vec())?);
        debug!(base_url, "created client");
        clients.insert(base_url.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// Number of cached clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no client was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::*;
    use crate::JsonCodec;
    use crate::testing::ScriptedTransport;

    fn setup() -> (ClientFactory, Chain, Vec<Arc<dyn BodyCodec>>) {
        let chain = Chain::builder().build(ScriptedTransport::status(200));
        let codecs: Vec<Arc<dyn BodyCodec>> = vec![Arc::new(JsonCodec::new())];
        (ClientFactory::new(), chain, codecs)
    }

    #[test]
    fn same_base_url_returns_same_client() {
        let (factory, chain, codecs) = setup();

        let first = factory
            .get_instance(&chain, "https://api.example.com/", &codecs)
            .expect("client");
        let second = factory
            .get_instance(&chain, "https://api.example.com/", &codecs)
            .expect("client");

        check!(Arc::ptr_eq(&first, &second));
        check!(factory.len() == 1);
    }

    #[test]
    fn distinct_base_urls_get_distinct_clients() {
        let (factory, chain, codecs) = setup();

        let api = factory
            .get_instance(&chain, "https://api.example.com/", &codecs)
            .expect("client");
        let cdn = factory
            .get_instance(&chain, "https://cdn.example.com/", &codecs)
            .expect("client");

        check!(!Arc::ptr_eq(&api, &cdn));
        check!(cdn.base_url().as_str() == "https://cdn.example.com/");
        check!(factory.len() == 2);
    }

    #[test]
    fn invalid_base_url_is_not_cached() {
        let (factory, chain, codecs) = setup();

        check!(factory.get_instance(&chain, "not a url", &codecs).is_err());
        check!(factory.is_empty());
    }

    #[test]
    fn concurrent_first_use_creates_one_client() {
        let (factory, chain, codecs) = setup();

        let clients: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        factory
                            .get_instance(&chain, "https://api.example.com/", &codecs)
                            .expect("client")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("thread"))
                .collect()
        });

        check!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        check!(factory.len() == 1);
    }
}
