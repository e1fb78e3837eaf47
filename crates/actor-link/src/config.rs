use std::time::Duration;

/// Default period between keep-alive checks.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Default deadline for a Pong after sending a Ping.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on the Hello → Welcome exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on the TCP connect used by [`open`](crate::ConnectorChannel::open).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timer configuration for a channel. Immutable once the channel is built.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Period of the keep-alive ticker. A Ping is only sent on a tick when
    /// no outbound traffic happened within the period.
    pub keepalive_interval: Duration,
    /// How long to wait for the peer's Pong before declaring it dead.
    pub keepalive_timeout: Duration,
    /// How long to wait for the peer's Welcome before giving up.
    pub handshake_timeout: Duration,
    /// Connect bound used by `open`; `open_with_timeout` overrides it.
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            keepalive_timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}
