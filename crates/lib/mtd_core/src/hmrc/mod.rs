//! HMRC REST client.
//!
//! One method per remote operation. Every call carries a bearer token and a
//! freshly composed fraud-prevention header set; non-success responses are
//! classified by [`crate::translate`].

pub mod business;
pub mod obligations;
pub mod wire;

use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use crate::error::{MtdError, MtdResult};
use crate::fraud_headers::FraudPreventionHeaderSet;
use crate::models::{AccessToken, BusinessType};
use crate::tax_year::{SubmissionProtocol, TaxYear};
use crate::translate::{RemoteFailure, translate};

pub use business::{BusinessIdResolver, PassthroughResolver, SandboxResolver};

pub const CORRELATION_ID_HEADER: &str = "X-CorrelationId";

/// Versioned HMRC APIs this client speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    SelfEmployment,
    Property,
    Obligations,
    BusinessDetails,
    TestSupport,
}

impl ApiVersion {
    pub fn accept(&self) -> &'static str {
        match self {
            ApiVersion::SelfEmployment => "application/vnd.hmrc.5.0+json",
            ApiVersion::Property => "application/vnd.hmrc.6.0+json",
            ApiVersion::Obligations => "application/vnd.hmrc.3.0+json",
            ApiVersion::BusinessDetails => "application/vnd.hmrc.2.0+json",
            ApiVersion::TestSupport => "application/vnd.hmrc.1.0+json",
        }
    }

    pub fn for_business_type(business_type: BusinessType) -> Self {
        match business_type {
            BusinessType::SelfEmployment => ApiVersion::SelfEmployment,
            BusinessType::UkProperty | BusinessType::ForeignProperty => ApiVersion::Property,
        }
    }
}

/// Credentials and compliance headers for one outbound call.
#[derive(Debug, Clone, Copy)]
pub struct CallAuth<'a> {
    pub token: &'a AccessToken,
    pub fraud_headers: &'a FraudPreventionHeaderSet,
}

/// The business summary a call addresses.
#[derive(Debug, Clone, Copy)]
pub struct SummaryTarget<'a> {
    pub nino: &'a str,
    /// Id used on the wire; already resolved in the sandbox.
    pub business_id: &'a str,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
}

impl SummaryTarget<'_> {
    fn api(&self) -> ApiVersion {
        ApiVersion::for_business_type(self.business_type)
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Option<Value>,
    pub correlation_id: Option<String>,
}

impl RemoteResponse {
    /// Remote id for a submission: body id when present, else correlation id.
    pub fn submission_id(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| {
                ["periodId", "submissionId", "transactionReference"]
                    .iter()
                    .find_map(|k| b.get(*k).and_then(Value::as_str))
            })
            .map(str::to_string)
            .or_else(|| self.correlation_id.clone())
    }
}

#[derive(Clone)]
pub struct HmrcClient {
    http: reqwest::Client,
    base_url: String,
}

impl HmrcClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::new(reqwest::Client::new(), base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        api: ApiVersion,
        auth: CallAuth<'_>,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> MtdResult<RemoteResponse> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "HMRC request");

        let mut req = self
            .http
            .request(method, &url)
            .header(ACCEPT, api.accept())
            .header(AUTHORIZATION, format!("Bearer {}", auth.token.as_str()));
        for (name, value) in auth.fraud_headers.iter() {
            req = req.header(name, value);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| MtdError::RemoteTransient(format!("HMRC unreachable: {e}")))?;

        let status = resp.status().as_u16();
        let correlation_id = resp
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp
            .text()
            .await
            .map_err(|e| MtdError::RemoteTransient(format!("HMRC response unreadable: {e}")))?;

        if !(200..300).contains(&status) {
            debug!(status, correlation_id = ?correlation_id, "HMRC error response");
            return Err(translate(&RemoteFailure {
                status,
                body: text,
                correlation_id,
            })
            .into());
        }

        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).map_err(|e| {
                MtdError::RemoteUnknown(format!("HMRC returned malformed JSON: {e}"))
            })?)
        };
        Ok(RemoteResponse {
            status,
            body,
            correlation_id,
        })
    }

    /// Create a period summary (period protocol).
    pub async fn create_period_summary(
        &self,
        auth: CallAuth<'_>,
        target: SummaryTarget<'_>,
        body: &Value,
    ) -> MtdResult<RemoteResponse> {
        let path = wire::period_path(&target);
        self.execute(Method::POST, &path, target.api(), auth, &[], Some(body))
            .await
    }

    /// Create or amend the year-to-date summary (cumulative protocol).
    pub async fn amend_cumulative_summary(
        &self,
        auth: CallAuth<'_>,
        target: SummaryTarget<'_>,
        body: &Value,
    ) -> MtdResult<RemoteResponse> {
        let path = wire::cumulative_path(&target);
        self.execute(Method::PUT, &path, target.api(), auth, &[], Some(body))
            .await
    }

    /// Send a rendered body with the given protocol.
    pub async fn send_summary(
        &self,
        auth: CallAuth<'_>,
        target: SummaryTarget<'_>,
        protocol: SubmissionProtocol,
        body: &Value,
    ) -> MtdResult<RemoteResponse> {
        match protocol {
            SubmissionProtocol::Period => self.create_period_summary(auth, target, body).await,
            SubmissionProtocol::Cumulative => {
                self.amend_cumulative_summary(auth, target, body).await
            }
        }
    }

    /// The remote year-to-date summary, or `None` when HMRC holds nothing.
    pub async fn retrieve_cumulative(
        &self,
        auth: CallAuth<'_>,
        target: SummaryTarget<'_>,
    ) -> MtdResult<Option<Value>> {
        let path = wire::cumulative_path(&target);
        match self
            .execute(Method::GET, &path, target.api(), auth, &[], None)
            .await
        {
            Ok(resp) => Ok(resp.body),
            Err(MtdError::RemoteNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
