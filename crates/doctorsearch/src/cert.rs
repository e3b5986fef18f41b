//! Pinned-CA HTTPS client for the update source.
//!
//! The registry extract is only ever fetched from the national health
//! directory's own infrastructure, so the client trusts exactly one
//! root certificate instead of the system trust store.

use std::time::Duration;

use crate::error::UpdateError;

/// ASIP Santé root certificate (IGC-Santé), the sole CA this client trusts.
/// See <http://igc-sante.esante.gouv.fr/PC/>.
const PINNED_ROOT_CA_PEM: &str = include_str!("asip_sante_root_ca.pem");

/// Builds an HTTP client that trusts only [`PINNED_ROOT_CA_PEM`], with
/// keep-alive disabled and conservative handshake/dial timeouts.
pub fn build_http_client() -> Result<reqwest::Client, UpdateError> {
	let cert = reqwest::Certificate::from_pem(PINNED_ROOT_CA_PEM.as_bytes())
		.map_err(UpdateError::Certificate)?;

	reqwest::Client::builder()
		.tls_built_in_root_certs(false)
		.add_root_certificate(cert)
		.pool_max_idle_per_host(0)
		.connect_timeout(Duration::from_secs(30))
		.timeout(Duration::from_secs(45))
		.build()
		.map_err(UpdateError::Certificate)
}
