use std::sync::Arc;

use rustls::crypto::ring::default_provider;
use rustls::ClientConfig;
use rustls_platform_verifier::BuilderVerifierExt;

/// Client configuration for the upstream connection, trusting the operating
/// system's certificate store.
pub fn platform_client_config() -> crate::Result<Arc<ClientConfig>> {
    let config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()?
        .with_platform_verifier()
        .with_no_client_auth();
    Ok(Arc::new(with_http1_alpn(config)))
}

/// Only HTTP/1.1 is spoken on the upstream connection.
pub fn with_http1_alpn(mut config: ClientConfig) -> ClientConfig {
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    config
}
