//! Inbound fraud-prevention signals.
//!
//! The browser forwards its `Gov-Client-*` headers; the socket peer and the
//! `X-Forwarded-For` chain are observed here and handed to the composer as
//! an explicit [`RequestContext`].

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use mtd_core::fraud_headers::{ClientHeaders, RequestContext};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Client-supplied headers plus what the server saw of the connection.
#[derive(Debug, Clone, Default)]
pub struct FraudSignals {
    pub client: ClientHeaders,
    pub peer: Option<SocketAddr>,
    pub forwarded_for: Option<String>,
}

impl FraudSignals {
    pub fn context(&self, user_id: &str) -> RequestContext {
        let mut ctx = RequestContext::new(user_id);
        if let Some(addr) = self.peer {
            ctx = ctx.with_socket_addr(addr);
        }
        if let Some(chain) = &self.forwarded_for {
            ctx = ctx.with_forwarded_for(chain);
        }
        ctx
    }
}

impl<S: Send + Sync> FromRequestParts<S> for FraudSignals {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let client = ClientHeaders::from_pairs(
            parts
                .headers
                .iter()
                .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?))),
        );
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let forwarded_for = parts
            .headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(Self {
            client,
            peer,
            forwarded_for,
        })
    }
}
