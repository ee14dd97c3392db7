//! Business id resolution.
//!
//! In production the business id from obligations is used as-is. The
//! sandbox hands out synthetic ids that its stateful backend does not know,
//! so before a create/amend the sandbox resolver finds (or creates) a real
//! test business of the same type. Which one runs is fixed at construction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ApiVersion, CallAuth, HmrcClient};
use crate::config::MtdConfig;
use crate::error::{MtdError, MtdResult};
use crate::models::BusinessType;

#[async_trait]
pub trait BusinessIdResolver: Send + Sync {
    /// The id to use on the wire for `business_id`.
    async fn resolve(
        &self,
        auth: CallAuth<'_>,
        nino: &str,
        business_type: BusinessType,
        business_id: &str,
    ) -> MtdResult<String>;
}

/// Production: ids are already real.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

#[async_trait]
impl BusinessIdResolver for PassthroughResolver {
    async fn resolve(
        &self,
        _auth: CallAuth<'_>,
        _nino: &str,
        _business_type: BusinessType,
        business_id: &str,
    ) -> MtdResult<String> {
        Ok(business_id.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusinessList {
    #[serde(default)]
    list_of_businesses: Vec<BusinessSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusinessSummary {
    type_of_business: String,
    business_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedBusiness {
    business_id: String,
}

/// Sandbox: map synthetic ids onto real test businesses, creating one when
/// the test user has none of the right type. Results are cached.
pub struct SandboxResolver {
    client: HmrcClient,
    cache: DashMap<(String, BusinessType, String), String>,
}

impl SandboxResolver {
    pub fn new(client: HmrcClient) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }

    async fn list(
        &self,
        auth: CallAuth<'_>,
        nino: &str,
    ) -> MtdResult<Vec<BusinessSummary>> {
        let path = format!("/individuals/business/details/{nino}/list");
        let result = self
            .client
            .execute(Method::GET, &path, ApiVersion::BusinessDetails, auth, &[], None)
            .await;
        let body = match result {
            Ok(resp) => resp.body,
            Err(MtdError::RemoteNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let Some(body) = body else {
            return Ok(Vec::new());
        };
        let list: BusinessList = serde_json::from_value(body)
            .map_err(|e| MtdError::RemoteUnknown(format!("Unexpected business list: {e}")))?;
        Ok(list.list_of_businesses)
    }

    async fn create(
        &self,
        auth: CallAuth<'_>,
        nino: &str,
        business_type: BusinessType,
    ) -> MtdResult<String> {
        let path = format!("/individuals/self-assessment-test-support/business/{nino}");
        let body = test_business_body(business_type);
        let resp = self
            .client
            .execute(Method::POST, &path, ApiVersion::TestSupport, auth, &[], Some(&body))
            .await?;
        let created: CreatedBusiness = resp
            .body
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| MtdError::RemoteUnknown(format!("Unexpected test business: {e}")))?
            .ok_or_else(|| MtdError::RemoteUnknown("Test business created without an id".into()))?;
        Ok(created.business_id)
    }
}

fn test_business_body(business_type: BusinessType) -> serde_json::Value {
    let start = NaiveDate::from_ymd_opt(2024, 4, 6);
    let end = NaiveDate::from_ymd_opt(2025, 4, 5);
    let mut body = json!({
        "typeOfBusiness": business_type.as_str(),
        "firstAccountingPeriodStartDate": start,
        "firstAccountingPeriodEndDate": end,
        "accountingType": "CASH",
        "commencementDate": "2020-04-06",
    });
    if business_type == BusinessType::SelfEmployment {
        body["tradingName"] = json!("Sandbox Trading");
        body["businessAddressLineOne"] = json!("1 Test Street");
        body["businessAddressPostcode"] = json!("TF3 4NT");
        body["businessAddressCountryCode"] = json!("GB");
    }
    body
}

#[async_trait]
impl BusinessIdResolver for SandboxResolver {
    async fn resolve(
        &self,
        auth: CallAuth<'_>,
        nino: &str,
        business_type: BusinessType,
        business_id: &str,
    ) -> MtdResult<String> {
        let key = (nino.to_string(), business_type, business_id.to_string());
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.value().clone());
        }

        let businesses = self.list(auth, nino).await?;
        let existing = businesses
            .iter()
            .find(|b| b.business_id == business_id)
            .or_else(|| {
                businesses
                    .iter()
                    .find(|b| b.type_of_business == business_type.as_str())
            })
            .map(|b| b.business_id.clone());

        let resolved = match existing {
            Some(id) => id,
            None => {
                let id = self.create(auth, nino, business_type).await?;
                info!(%business_type, business_id = %id, "created sandbox test business");
                id
            }
        };
        if resolved != business_id {
            info!(
                original = business_id,
                resolved = %resolved,
                "resolved sandbox business id"
            );
        }
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }
}

/// The resolver for the configured environment.
pub fn resolver_for(config: &MtdConfig, client: HmrcClient) -> Arc<dyn BusinessIdResolver> {
    if config.is_production() {
        Arc::new(PassthroughResolver)
    } else {
        Arc::new(SandboxResolver::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VendorInfo;
    use crate::fraud_headers::{
        ClientHeaders, FraudHeaderComposer, FraudPreventionHeaderSet, HeaderPolicy, RequestContext,
    };
    use crate::models::AccessToken;
    use httpmock::prelude::*;

    fn fraud() -> FraudPreventionHeaderSet {
        FraudHeaderComposer::new(VendorInfo {
            product_name: "mtd".into(),
            version: "1.0".into(),
            public_ip: None,
        })
        .compose(&ClientHeaders::default(), &RequestContext::new("u1"), HeaderPolicy::Lenient)
        .unwrap()
    }

    #[tokio::test]
    async fn passthrough_returns_input() {
        let token = AccessToken::new("t");
        let headers = fraud();
        let auth = CallAuth { token: &token, fraud_headers: &headers };
        let id = PassthroughResolver
            .resolve(auth, "AA123456A", BusinessType::UkProperty, "XPIS1")
            .await
            .unwrap();
        assert_eq!(id, "XPIS1");
    }

    #[tokio::test]
    async fn sandbox_prefers_listed_business_of_same_type() {
        let server = MockServer::start_async().await;
        let list = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/individuals/business/details/AA123456A/list")
                    .header("accept", "application/vnd.hmrc.2.0+json");
                then.status(200).json_body(serde_json::json!({
                    "listOfBusinesses": [
                        {"typeOfBusiness": "self-employment", "businessId": "XAIS00000000001"},
                        {"typeOfBusiness": "uk-property", "businessId": "XPIS00000000002"}
                    ]
                }));
            })
            .await;

        let resolver = SandboxResolver::new(HmrcClient::with_base_url(server.base_url()));
        let token = AccessToken::new("t");
        let headers = fraud();
        let auth = CallAuth { token: &token, fraud_headers: &headers };
        for _ in 0..2 {
            let id = resolver
                .resolve(auth, "AA123456A", BusinessType::UkProperty, "SYNTHETIC")
                .await
                .unwrap();
            assert_eq!(id, "XPIS00000000002");
        }
        list.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn sandbox_creates_business_when_none_fits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/individuals/business/details/AA123456A/list");
                then.status(404).json_body(serde_json::json!({
                    "code": "MATCHING_RESOURCE_NOT_FOUND", "message": "none"
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/individuals/self-assessment-test-support/business/AA123456A")
                    .body_includes("\"typeOfBusiness\":\"foreign-property\"");
                then.status(201)
                    .json_body(serde_json::json!({"businessId": "XFIS00000000003"}));
            })
            .await;

        let resolver = SandboxResolver::new(HmrcClient::with_base_url(server.base_url()));
        let token = AccessToken::new("t");
        let headers = fraud();
        let auth = CallAuth { token: &token, fraud_headers: &headers };
        let id = resolver
            .resolve(auth, "AA123456A", BusinessType::ForeignProperty, "SYNTHETIC")
            .await
            .unwrap();
        assert_eq!(id, "XFIS00000000003");
        create.assert_async().await;
    }
}
