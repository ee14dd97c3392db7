//! Fraud-prevention header composition.
//!
//! HMRC requires a fixed set of `Gov-Client-*` and `Gov-Vendor-*` headers on
//! every call. Device and browser signals come from the client; network
//! signals (public IP, port, timestamp, forwarding chain) are observed by
//! the server. A fresh set is composed for every outbound request.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::VendorInfo;
use crate::error::{MtdError, MtdResult};

pub const CONNECTION_METHOD: &str = "WEB_APP_VIA_SERVER";

/// Client-observed headers the browser is expected to send.
pub const CLIENT_SUPPLIED: &[&str] = &[
    "Gov-Client-Browser-JS-User-Agent",
    "Gov-Client-Browser-Do-Not-Track",
    "Gov-Client-Device-ID",
    "Gov-Client-Multi-Factor",
    "Gov-Client-Screens",
    "Gov-Client-Timezone",
    "Gov-Client-User-IDs",
    "Gov-Client-Window-Size",
];

/// Headers the server sets itself. Client copies are discarded.
const SERVER_DERIVED: &[&str] = &[
    "Gov-Client-Connection-Method",
    "Gov-Client-Public-IP",
    "Gov-Client-Public-IP-Timestamp",
    "Gov-Client-Public-Port",
];

/// How strictly missing client headers are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// Submission endpoints: the client header family must be present.
    Strict,
    /// Read-only endpoints: a user-id header is synthesised when absent.
    Lenient,
}

/// Explicit per-request context observed by the server.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: String,
    pub socket_addr: Option<SocketAddr>,
    /// `X-Forwarded-For` chain, client first.
    pub forwarded_for: Vec<String>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_socket_addr(mut self, addr: SocketAddr) -> Self {
        self.socket_addr = Some(addr);
        self
    }

    /// Parse a raw `X-Forwarded-For` value.
    pub fn with_forwarded_for(mut self, header: &str) -> Self {
        self.forwarded_for = header
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    /// The originating client address: the first forwarded hop, else the
    /// socket peer.
    pub fn client_ip(&self) -> Option<String> {
        self.forwarded_for
            .first()
            .cloned()
            .or_else(|| self.socket_addr.map(|a| a.ip().to_string()))
    }

    fn hops(&self) -> Vec<String> {
        let mut hops = self.forwarded_for.clone();
        if let Some(addr) = self.socket_addr {
            let ip = addr.ip().to_string();
            if hops.last() != Some(&ip) {
                hops.push(ip);
            }
        }
        hops
    }
}

/// Fraud headers forwarded by the client, keyed by lowercase name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientHeaders(BTreeMap<String, String>);

impl ClientHeaders {
    /// Keep only recognised client-supplied `Gov-Client-*` headers.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let known: Vec<String> = CLIENT_SUPPLIED.iter().map(|h| h.to_ascii_lowercase()).collect();
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
                .filter(|(k, v)| known.contains(k) && !v.is_empty())
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The composed headers for one outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FraudPreventionHeaderSet(BTreeMap<String, String>);

impl FraudPreventionHeaderSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_string(), value.into());
    }
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[derive(Debug, Clone)]
pub struct FraudHeaderComposer {
    vendor: VendorInfo,
}

impl FraudHeaderComposer {
    pub fn new(vendor: VendorInfo) -> Self {
        Self { vendor }
    }

    pub fn compose(
        &self,
        client: &ClientHeaders,
        ctx: &RequestContext,
        policy: HeaderPolicy,
    ) -> MtdResult<FraudPreventionHeaderSet> {
        self.compose_at(client, ctx, policy, Utc::now())
    }

    pub fn compose_at(
        &self,
        client: &ClientHeaders,
        ctx: &RequestContext,
        policy: HeaderPolicy,
        now: DateTime<Utc>,
    ) -> MtdResult<FraudPreventionHeaderSet> {
        if policy == HeaderPolicy::Strict {
            if client.is_empty() {
                return Err(MtdError::Validation(
                    "Fraud prevention headers (Gov-Client-*) are required for submissions".into(),
                ));
            }
            if client.get("Gov-Client-Device-ID").is_none() {
                return Err(MtdError::Validation(
                    "Gov-Client-Device-ID header is required for submissions".into(),
                ));
            }
        }

        let mut set = FraudPreventionHeaderSet::default();
        for name in CLIENT_SUPPLIED {
            if let Some(v) = client.get(name) {
                set.insert(name, v);
            }
        }
        if set.get("Gov-Client-User-IDs").is_none() {
            set.insert(
                "Gov-Client-User-IDs",
                format!("{}={}", encode(&self.vendor.product_name), encode(&ctx.user_id)),
            );
        }

        set.insert(SERVER_DERIVED[0], CONNECTION_METHOD);
        if let Some(ip) = ctx.client_ip() {
            set.insert(SERVER_DERIVED[1], ip);
            set.insert(
                SERVER_DERIVED[2],
                now.to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }
        if let Some(addr) = ctx.socket_addr
            && ctx.forwarded_for.is_empty()
        {
            set.insert(SERVER_DERIVED[3], addr.port().to_string());
        }

        set.insert("Gov-Vendor-Product-Name", encode(&self.vendor.product_name));
        set.insert(
            "Gov-Vendor-Version",
            format!("{}={}", encode(&self.vendor.product_name), encode(&self.vendor.version)),
        );
        if let Some(vendor_ip) = &self.vendor.public_ip {
            set.insert("Gov-Vendor-Public-IP", vendor_ip.clone());
            let forwarded = self.forwarding_chain(ctx, vendor_ip);
            if !forwarded.is_empty() {
                set.insert("Gov-Vendor-Forwarded", forwarded);
            }
        }

        Ok(set)
    }

    /// `by=<receiver>&for=<sender>` per hop, ending at our own public IP.
    fn forwarding_chain(&self, ctx: &RequestContext, vendor_ip: &str) -> String {
        let hops = ctx.hops();
        let mut links: Vec<String> = hops
            .windows(2)
            .map(|w| format!("by={}&for={}", encode(&w[1]), encode(&w[0])))
            .collect();
        if let Some(last) = hops.last() {
            links.push(format!("by={}&for={}", encode(vendor_ip), encode(last)));
        }
        links.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn composer() -> FraudHeaderComposer {
        FraudHeaderComposer::new(VendorInfo {
            product_name: "mtd submissions".into(),
            version: "1.2.0".into(),
            public_ip: Some("203.0.113.10".into()),
        })
    }

    fn browser_headers() -> ClientHeaders {
        ClientHeaders::from_pairs([
            ("gov-client-device-id", "beec798b-b366-47fa-b1f8-92cede14a1ce"),
            ("Gov-Client-Timezone", "UTC+01:00"),
            ("Gov-Client-Public-IP", "6.6.6.6"),
            ("X-Unrelated", "ignored"),
        ])
    }

    #[test]
    fn strict_policy_rejects_missing_family() {
        let ctx = RequestContext::new("user-1");
        let err = composer()
            .compose(&ClientHeaders::default(), &ctx, HeaderPolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, MtdError::Validation(_)));
    }

    #[test]
    fn lenient_policy_synthesises_user_ids() {
        let ctx = RequestContext::new("user 1");
        let set = composer()
            .compose(&ClientHeaders::default(), &ctx, HeaderPolicy::Lenient)
            .unwrap();
        assert_eq!(set.get("Gov-Client-User-IDs"), Some("mtd+submissions=user+1"));
        assert_eq!(set.get("Gov-Client-Connection-Method"), Some(CONNECTION_METHOD));
    }

    #[test]
    fn server_observed_values_override_client_copies() {
        let ctx = RequestContext::new("user-1")
            .with_socket_addr("10.0.0.5:44321".parse().unwrap())
            .with_forwarded_for("198.51.100.7, 10.0.0.2");
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let set = composer()
            .compose_at(&browser_headers(), &ctx, HeaderPolicy::Strict, now)
            .unwrap();

        assert_eq!(set.get("Gov-Client-Public-IP"), Some("198.51.100.7"));
        assert_eq!(
            set.get("Gov-Client-Public-IP-Timestamp"),
            Some("2025-06-01T12:00:00.000Z")
        );
        assert_eq!(set.get("Gov-Client-Timezone"), Some("UTC+01:00"));
        assert_eq!(set.get("Gov-Vendor-Version"), Some("mtd+submissions=1.2.0"));
        assert_eq!(
            set.get("Gov-Vendor-Forwarded"),
            Some(
                "by=10.0.0.2&for=198.51.100.7,by=10.0.0.5&for=10.0.0.2,by=203.0.113.10&for=10.0.0.5"
            )
        );
        // Port of a proxied connection is not the client's.
        assert!(set.get("Gov-Client-Public-Port").is_none());
    }

    #[test]
    fn direct_connection_reports_port() {
        let ctx = RequestContext::new("user-1").with_socket_addr("198.51.100.7:51000".parse().unwrap());
        let set = composer()
            .compose(&browser_headers(), &ctx, HeaderPolicy::Strict)
            .unwrap();
        assert_eq!(set.get("Gov-Client-Public-Port"), Some("51000"));
        assert_eq!(
            set.get("Gov-Vendor-Forwarded"),
            Some("by=203.0.113.10&for=198.51.100.7")
        );
    }
}
