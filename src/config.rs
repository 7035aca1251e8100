use std::net::SocketAddr;
use std::time::Duration;

pub const UPSTREAM_HOST: &str = "tplfvg.it";
pub const UPSTREAM_PORT: u16 = 443;
pub const FORWARDED_PREFIXES: [&str; 2] = ["/it", "/services/timetables"];

/// The single remote host matching requests are sent to, always over TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    host: String,
    port: u16,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Value sent as the outbound `host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for UpstreamTarget {
    fn default() -> Self {
        Self::new(UPSTREAM_HOST, UPSTREAM_PORT)
    }
}

/// Ordered set of path prefixes. Comparison is byte-wise and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingRule {
    prefixes: Vec<String>,
}

impl ForwardingRule {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl Default for ForwardingRule {
    fn default() -> Self {
        Self::new(FORWARDED_PREFIXES)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    /// Address of the local build server that owns every non-forwarded request.
    pub local: SocketAddr,
    pub upstream: UpstreamTarget,
    pub rule: ForwardingRule,
    /// Bounds TCP connect plus TLS handshake to the upstream. `None` waits forever.
    pub connect_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8181)),
            local: SocketAddr::from(([127, 0, 0, 1], 8000)),
            upstream: UpstreamTarget::default(),
            rule: ForwardingRule::default(),
            connect_timeout: None,
        }
    }
}
