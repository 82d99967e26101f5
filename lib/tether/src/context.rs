//! Network context: the owner of configuration, chain, client cache and
//! listener registry.
//!
//! A context starts uninitialized. [`NetworkContext::initialize`] builds the
//! standard chain once; services and clients can be created afterwards.
//! [`NetworkContext::teardown`] drops the chain and cached clients, allowing
//! a fresh initialization. Listener registrations are independent of that
//! lifecycle.

use std::sync::{Arc, PoisonError, RwLock};

use tower::util::BoxCloneService;
use tower_service::Service;
use tracing::info;

use crate::config::ensure_trailing_slash;
use crate::middleware::{ApiListener, ListenerRegistry, TokenProvider};
use crate::{
    ApiClient, ApiPath, ApiService, BodyCodec, BoxedService, Chain, ChainBuilder, ClientFactory,
    Error, HyperTransport, Interceptor, JsonCodec, NetworkConfiguration, Request, Response, Result,
    TextCodec,
};

type TransportFactory = dyn Fn(&NetworkConfiguration) -> BoxedService + Send + Sync;

struct Initialized {
    config: Arc<NetworkConfiguration>,
    chain: Chain,
    codecs: Vec<Arc<dyn BodyCodec>>,
    clients: ClientFactory,
}

/// Explicitly owned replacement for process-wide network state.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tether::{NetworkConfiguration, NetworkContext};
///
/// let context = NetworkContext::new();
/// context.initialize(
///     NetworkConfiguration::builder("https://api.example.com").build()?,
///     Arc::new(MyTokenProvider::default()),
/// )?;
///
/// let users: UserApi = context.create_service(None)?;
/// ```
pub struct NetworkContext {
    registry: Arc<ListenerRegistry>,
    transport: Option<Arc<TransportFactory>>,
    interceptors: Vec<Interceptor>,
    state: RwLock<Option<Initialized>>,
}

impl std::fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkContext")
            .field("initialized", &self.is_initialized())
            .field("registry", &self.registry)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

impl Default for NetworkContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkContext {
    /// Create an uninitialized context using the default transport.
    #[must_use]
    pub fn new() -> Self {
        NetworkContextBuilder::default().build()
    }

    /// Create a builder to customize the transport or add interceptors.
    #[must_use]
    pub fn builder() -> NetworkContextBuilder {
        NetworkContextBuilder::default()
    }

    /// Set up the chain from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the context is already
    /// initialized.
    pub fn initialize(
        &self,
        config: NetworkConfiguration,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            return Err(Error::configuration("network context is already initialized"));
        }

        let transport = match &self.transport {
            Some(factory) => factory(&config),
            None => BoxCloneService::new(HyperTransport::new(&config)),
        };
        let chain = self
            .interceptors
            .iter()
            .cloned()
            .fold(
                ChainBuilder::standard(&config, token_provider, Arc::clone(&self.registry)),
                ChainBuilder::interceptor,
            )
            .build(transport);

        let json = if config.pretty_json() {
            JsonCodec::pretty()
        } else {
            JsonCodec::new()
        };
        let codecs: Vec<Arc<dyn BodyCodec>> = vec![Arc::new(json), Arc::new(TextCodec)];

        info!(base_url = config.base_url(), interceptors = ?chain.names(), "network context initialized");
        *state = Some(Initialized {
            config: Arc::new(config),
            chain,
            codecs,
            clients: ClientFactory::new(),
        });
        Ok(())
    }

    /// Returns `true` between [`initialize`](Self::initialize) and
    /// [`teardown`](Self::teardown).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the chain and every cached client.
    ///
    /// Listener registrations are kept.
    pub fn teardown(&self) {
        let previous = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("network context torn down");
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&Initialized) -> Result<T>) -> Result<T> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let initialized = state
            .as_ref()
            .ok_or_else(|| Error::configuration("network context is not initialized"))?;
        f(initialized)
    }

    /// Active configuration.
    pub fn configuration(&self) -> Result<Arc<NetworkConfiguration>> {
        self.with_state(|state| Ok(Arc::clone(&state.config)))
    }

    /// Cached client for `base_url`, defaulting to the configured one.
    ///
    /// Base URLs are canonicalized with a trailing `/`, so `https://a/v1`
    /// and `https://a/v1/` share a client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] before initialization, or an error
    /// if `base_url` is not a valid URL.
    pub fn client_for(&self, base_url: Option<&str>) -> Result<Arc<ApiClient>> {
        self.with_state(|state| {
            let base_url = ensure_trailing_slash(base_url.unwrap_or(state.config.base_url()));
            state
                .clients
                .get_instance(&state.chain, &base_url, &state.codecs)
        })
    }

    /// Build service `S` bound to `base_url`, defaulting to the configured one.
    ///
    /// # Errors
    ///
    /// Same as [`client_for`](Self::client_for).
    pub fn create_service<S: ApiService>(&self, base_url: Option<&str>) -> Result<S> {
        self.client_for(base_url).map(S::from_client)
    }

    /// Registry shared by the response observer.
    #[must_use]
    pub const fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Observe responses matching `api_path`.
    pub fn add_listener(&self, api_path: ApiPath, listener: Arc<dyn ApiListener>) {
        self.registry.add(api_path, listener);
    }

    /// Stop observing `api_path` with `listener`.
    ///
    /// Returns `true` if it was registered.
    pub fn remove_listener(&self, api_path: &ApiPath, listener: &Arc<dyn ApiListener>) -> bool {
        self.registry.remove(api_path, listener)
    }
}

/// Builder for [`NetworkContext`].
#[derive(Default)]
pub struct NetworkContextBuilder {
    transport: Option<Arc<TransportFactory>>,
    interceptors: Vec<Interceptor>,
}

impl std::fmt::Debug for NetworkContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkContextBuilder")
            .field("custom_transport", &self.transport.is_some())
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl NetworkContextBuilder {
    /// Replace the default [`HyperTransport`].
    #[must_use]
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync + 'static,
        T::Future: Send,
    {
        self.transport = Some(Arc::new(move |_: &NetworkConfiguration| {
            BoxCloneService::new(transport.clone())
        }));
        self
    }

    /// Add an interceptor between retry and the transport.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Build the uninitialized context.
    #[must_use]
    pub fn build(self) -> NetworkContext {
        NetworkContext {
            registry: Arc::new(ListenerRegistry::new()),
            transport: self.transport,
            interceptors: self.interceptors,
            state: RwLock::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::middleware::RefreshCallback;
    use crate::testing::ScriptedTransport;

    struct StaticToken;

    impl TokenProvider for StaticToken {
        fn token(&self) -> Option<String> {
            Some("abc".to_string())
        }

        fn refresh_token(&self, on_refreshed: RefreshCallback) {
            on_refreshed(None, 500);
        }
    }

    struct Users {
        client: Arc<ApiClient>,
    }

    impl ApiService for Users {
        fn from_client(client: Arc<ApiClient>) -> Self {
            Self { client }
        }
    }

    fn config() -> NetworkConfiguration {
        NetworkConfiguration::builder("https://api.example.com")
            .build()
            .expect("valid config")
    }

    fn context(transport: &ScriptedTransport) -> NetworkContext {
        NetworkContext::builder().transport(transport.clone()).build()
    }

    #[test]
    fn services_require_initialization() {
        let context = context(&ScriptedTransport::status(200));

        let_assert!(Err(err) = context.create_service::<Users>(None));
        check!(err.is_configuration());
        let_assert!(Err(err) = context.client_for(Some("https://api.example.com/")));
        check!(err.is_configuration());
        check!(context.configuration().is_err());
    }

    #[test]
    fn double_initialization_fails() {
        let context = context(&ScriptedTransport::status(200));
        context
            .initialize(config(), Arc::new(StaticToken))
            .expect("first initialization");

        let_assert!(Err(err) = context.initialize(config(), Arc::new(StaticToken)));
        check!(err.to_string() == "configuration error: network context is already initialized");
    }

    #[test]
    fn teardown_allows_reinitialization() {
        let context = context(&ScriptedTransport::status(200));
        context
            .initialize(config(), Arc::new(StaticToken))
            .expect("initialized");
        let before = context.client_for(None).expect("client");

        context.teardown();
        check!(!context.is_initialized());
        check!(context.client_for(None).is_err());

        context
            .initialize(config(), Arc::new(StaticToken))
            .expect("initialized again");
        let after = context.client_for(None).expect("client");
        check!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn services_share_clients_per_base_url() {
        let context = context(&ScriptedTransport::status(200));
        context
            .initialize(config(), Arc::new(StaticToken))
            .expect("initialized");

        let default: Users = context.create_service(None).expect("service");
        let explicit: Users = context
            .create_service(Some("https://api.example.com"))
            .expect("service");
        let other: Users = context
            .create_service(Some("https://cdn.example.com/assets"))
            .expect("service");

        check!(Arc::ptr_eq(&default.client, &explicit.client));
        check!(!Arc::ptr_eq(&default.client, &other.client));
        check!(other.client.base_url().as_str() == "https://cdn.example.com/assets/");
    }

    #[test]
    fn listeners_can_be_managed_before_initialization() {
        struct Ignore;
        impl ApiListener for Ignore {
            fn on_api_response(
                &self,
                _api_path: &ApiPath,
                _body: &str,
            ) -> std::result::Result<(), crate::middleware::ListenerError> {
                Ok(())
            }
        }

        let context = NetworkContext::new();
        let listener: Arc<dyn ApiListener> = Arc::new(Ignore);
        let path = ApiPath::new("users/{id}", crate::Method::Get);

        context.add_listener(path.clone(), Arc::clone(&listener));
        check!(context.listeners().len() == 1);
        check!(context.remove_listener(&path, &listener));
        check!(context.listeners().is_empty());
    }

    #[tokio::test]
    async fn requests_go_through_standard_chain() {
        let transport = ScriptedTransport::status(200);
        let context = context(&transport);
        context
            .initialize(config(), Arc::new(StaticToken))
            .expect("initialized");
        let client = context.client_for(None).expect("client");

        let request = client
            .request(crate::Method::Get, "users/1")
            .expect("request")
            .build();
        client.execute(request).await.expect("response");

        let sent = transport.requests();
        check!(sent[0].header("Authorization") == Some("Bearer abc"));
        check!(context.configuration().expect("config").base_url() == "https://api.example.com/");
    }
}
