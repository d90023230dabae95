//! Resolver settings

/// Namespace the resolver reads its configuration from by default
pub const DEFAULT_NAMESPACE: &str = "rabbitmq";

/// Where in the configuration tree the resolver looks.
///
/// With the default namespace the resolver reads
/// `rabbitmq.defaultConnection` and `rabbitmq.connections.<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    namespace: String,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ResolverOptions {
    /// Options using the default namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration below `namespace` instead
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Key holding the default connection name
    pub fn default_connection_key(&self) -> String {
        format!("{}.defaultConnection", self.namespace)
    }

    /// Key of the configuration subtree for `name`
    pub fn connection_key(&self, name: &str) -> String {
        format!("{}.connections.{}", self.namespace, name)
    }
}
