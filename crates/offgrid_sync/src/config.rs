//! Per-type push configuration.

/// Default HTTP method for endpoint pushes.
pub const DEFAULT_METHOD: &str = "PATCH";

/// An HTTP endpoint a type's changes are delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Target URL.
    pub url: String,
    /// HTTP method, `PATCH` unless overridden.
    pub method: String,
}

impl Endpoint {
    /// Creates an endpoint using the default method.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: DEFAULT_METHOD.to_string(),
        }
    }

    /// Overrides the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
}

/// How one entity type delivers its change sets.
///
/// A type pushes over the graph's duplex socket channel or to an HTTP
/// endpoint. The two are mutually exclusive by construction; the actual
/// transports are injected into the push router, never looked up from
/// ambient process state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushConfig {
    /// Deliver over the injected duplex socket channel.
    Socket,
    /// Deliver to an HTTP endpoint.
    Endpoint(Endpoint),
}

impl PushConfig {
    /// Creates an endpoint configuration with the default method.
    pub fn endpoint(url: impl Into<String>) -> Self {
        PushConfig::Endpoint(Endpoint::new(url))
    }
}
