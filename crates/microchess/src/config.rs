//! Client configuration and the [`ClientBuilder`].

use std::time::Duration;

use microchess_session::{ReconnectPolicy, SessionConfig};
use url::{Host, Url};

use crate::client::{ChessClient, ClientHandle};
use crate::stomp::StompBroker;

/// Environment variable overriding [`ClientConfig::broker_url`].
pub const BROKER_URL_ENV: &str = "MICROCHESS_BROKER_URL";

/// Broker endpoint used when nothing else is configured.
pub const DEFAULT_BROKER_URL: &str = "ws://localhost:8080/ws";

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Everything needed to reach the broker and run a session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the STOMP broker.
    pub broker_url: String,

    /// Virtual host sent in the `CONNECT` frame. `None` uses the host part
    /// of `broker_url`.
    pub host: Option<String>,

    /// How long to wait for the broker's `CONNECTED` frame.
    pub connect_timeout: Duration,

    /// Session behavior, e.g. what happens to subscriptions on reconnect.
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_owned(),
            host: None,
            connect_timeout: Duration::from_secs(10),
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, with the broker URL taken from `MICROCHESS_BROKER_URL`
    /// when it is set and non-empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(BROKER_URL_ENV).filter(|url| !url.trim().is_empty()) {
            config.broker_url = url.trim().to_owned();
        }
        config
    }

    /// The `host` header for the `CONNECT` frame.
    pub fn stomp_host(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => host_of(&self.broker_url).unwrap_or_else(|| "localhost".to_owned()),
        }
    }
}

/// Host part of a broker URL, without IPv6 brackets.
fn host_of(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let host = match url.host()? {
        Host::Domain(domain) => domain.to_owned(),
        Host::Ipv4(addr) => addr.to_string(),
        Host::Ipv6(addr) => addr.to_string(),
    };
    Some(host)
}

// ---------------------------------------------------------------------------
// ClientBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`ChessClient`].
///
/// # Example
///
/// ```rust,no_run
/// use microchess::prelude::*;
///
/// # async fn demo() -> Result<(), MicrochessError> {
/// let client = ClientBuilder::new()
///     .broker_url("ws://localhost:8080/ws")
///     .build();
/// client.connect()?;
/// client.request_create_proposal()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Sets the broker's WebSocket URL.
    #[must_use]
    pub fn broker_url(mut self, url: &str) -> Self {
        self.config.broker_url = url.to_owned();
        self
    }

    /// Sets the STOMP virtual host.
    #[must_use]
    pub fn host(mut self, host: &str) -> Self {
        self.config.host = Some(host.to_owned());
        self
    }

    /// Sets the `CONNECTED` wait limit.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets what happens to subscriptions when the connection drops.
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.config.session.reconnect_policy = policy;
        self
    }

    /// Spawns the client task over a STOMP broker and returns its handle.
    ///
    /// Nothing is dialed until [`ClientHandle::connect`]. Must be called
    /// within a Tokio runtime.
    pub fn build(self) -> ClientHandle {
        let (broker, events) = StompBroker::new(&self.config);
        ChessClient::start(broker, events, self.config.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.broker_url, "ws://localhost:8080/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.session.reconnect_policy, ReconnectPolicy::Resubscribe);
    }

    #[test]
    fn test_from_lookup_overrides_broker_url() {
        let config = ClientConfig::from_lookup(|key| {
            (key == BROKER_URL_ENV).then(|| " ws://chess.example:9000/ws ".to_owned())
        });
        assert_eq!(config.broker_url, "ws://chess.example:9000/ws");
    }

    #[test]
    fn test_from_lookup_ignores_blank_value() {
        let config = ClientConfig::from_lookup(|_| Some("   ".to_owned()));
        assert_eq!(config.broker_url, DEFAULT_BROKER_URL);
    }

    #[test]
    fn test_stomp_host_derived_from_url() {
        let mut config = ClientConfig::default();
        assert_eq!(config.stomp_host(), "localhost");

        config.broker_url = "wss://user@chess.example:443/ws".into();
        assert_eq!(config.stomp_host(), "chess.example");

        config.broker_url = "ws://[::1]:8080/ws".into();
        assert_eq!(config.stomp_host(), "::1");

        config.host = Some("vhost".into());
        assert_eq!(config.stomp_host(), "vhost");
    }

    #[test]
    fn test_host_of_ignores_query_and_fragment() {
        assert_eq!(
            host_of("ws://chess.example?token=abc").as_deref(),
            Some("chess.example")
        );
        assert_eq!(
            host_of("wss://chess.example#lobby").as_deref(),
            Some("chess.example")
        );
        assert_eq!(host_of("ws://10.0.0.7:61614").as_deref(), Some("10.0.0.7"));
    }

    #[test]
    fn test_host_of_rejects_unparseable_url() {
        assert_eq!(host_of("localhost:8080"), None);
        assert_eq!(host_of("not a url"), None);

        let config = ClientConfig {
            broker_url: "not a url".into(),
            ..ClientConfig::default()
        };
        assert_eq!(config.stomp_host(), "localhost");
    }

    #[test]
    fn test_builder_setters() {
        let builder = ClientBuilder::new()
            .broker_url("ws://127.0.0.1:1/ws")
            .host("h")
            .connect_timeout(Duration::from_millis(250))
            .reconnect_policy(ReconnectPolicy::Retain);
        assert_eq!(builder.config.broker_url, "ws://127.0.0.1:1/ws");
        assert_eq!(builder.config.host.as_deref(), Some("h"));
        assert_eq!(builder.config.connect_timeout, Duration::from_millis(250));
        assert_eq!(builder.config.session.reconnect_policy, ReconnectPolicy::Retain);
    }
}
