use std::sync::Arc;

use {
    rustls::{ClientConfig, RootCertStore, crypto::ring, pki_types::ServerName},
    tokio::net::TcpStream,
    tokio_rustls::{TlsConnector, client::TlsStream},
    tracing::{debug, warn},
};

use crate::error::{Error, Result};

/// Client config trusting the platform's native roots.
fn client_config() -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        warn!(error = %err, "failed to load a native certificate");
    }
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(added, ignored, "loaded native root certificates");

    Ok(
        ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(Error::tls)?
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// Run the TLS handshake over `tcp`, verifying the certificate for `host`.
pub(crate) async fn wrap(tcp: TcpStream, host: &str) -> Result<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(host.to_string()).map_err(Error::tls)?;
    let connector = TlsConnector::from(Arc::new(client_config()?));
    connector
        .connect(server_name, tcp)
        .await
        .map_err(Error::from)
}
