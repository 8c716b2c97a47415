use crate::errors::{ErrorKind, ProbeError};
use crate::lookup::meta::MetaRequest;
use crate::lookup::Request;
use crate::results::IpInfo;
use log::{debug, warn};
use reqwest::Client;
use std::time::Duration;

/// Where `/meta` is served.
pub const DEFAULT_BASE_URL: &str = "https://speed.cloudflare.com";

/// JSON client for the lookup endpoints.
#[derive(Debug, Clone)]
pub struct LookupClient {
    client: Client,
    base_url: String,
}

impl LookupClient {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProbeError::config("cannot build lookup client").with_source(e)
        })?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// Send `request` and decode its JSON body, whatever the content type.
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, ProbeError> {
        let endpoint = request.endpoint();
        let url = format!("{}/{}", self.base_url, endpoint.trim_matches('/'));
        debug!("{} {}", R::METHOD, url);

        let response = self
            .client
            .request(R::METHOD, &url)
            .headers(request.headers())
            .send()
            .await?
            .error_for_status()?;

        // The service labels JSON bodies as text/plain, so parse the text.
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ProbeError::new(
                ErrorKind::ServerRejected,
                format!("unexpected response from {}", url),
            )
            .with_source(e)
        })
    }

    /// Metadata for the calling host.
    pub async fn ip_info(&self) -> Result<IpInfo, ProbeError> {
        let meta = self.send(MetaRequest).await?;
        Ok(meta.into())
    }

    /// Like [`LookupClient::ip_info`] but never fails; any problem yields
    /// empty metadata.
    pub async fn ip_info_or_default(&self) -> IpInfo {
        match self.ip_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!("IP metadata lookup failed, continuing without it: {}", e);
                IpInfo::default()
            }
        }
    }
}
