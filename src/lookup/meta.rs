use crate::lookup::Request;
use crate::results::IpInfo;
use serde::Deserialize;
use std::borrow::Cow;

/// The subset of `/meta` the results need. Absent fields are empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Meta {
    pub client_ip: String,
    pub as_organization: String,
    pub country: String,
    pub region: String,
}

impl From<Meta> for IpInfo {
    fn from(meta: Meta) -> Self {
        IpInfo {
            isp: meta.as_organization,
            ip: meta.client_ip,
            country: meta.country,
            region: meta.region,
        }
    }
}

pub struct MetaRequest;

impl Request for MetaRequest {
    type Response = Meta;

    fn endpoint(&self) -> Cow<'_, str> {
        "/meta".into()
    }
}
