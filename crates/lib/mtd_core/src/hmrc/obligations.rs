//! Income and expenditure obligations.

use chrono::NaiveDate;
use reqwest::Method;
use serde::Deserialize;

use super::{ApiVersion, CallAuth, HmrcClient};
use crate::error::{MtdError, MtdResult};
use crate::models::{BusinessType, Obligation, ObligationStatus};
use crate::translate::not_found_as_default;

#[derive(Debug, Clone, Default)]
pub struct ObligationQuery {
    pub business_type: Option<BusinessType>,
    pub business_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
struct ObligationsResponse {
    #[serde(default)]
    obligations: Vec<BusinessObligations>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusinessObligations {
    #[serde(default)]
    business_id: Option<String>,
    #[serde(default)]
    obligation_details: Vec<ObligationDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObligationDetail {
    period_start_date: NaiveDate,
    period_end_date: NaiveDate,
    due_date: NaiveDate,
    #[serde(default)]
    received_date: Option<NaiveDate>,
    status: String,
    period_key: String,
}

impl HmrcClient {
    /// Obligations for a taxpayer, oldest first. "Nothing found" is an empty
    /// list; malformed identifiers still surface as business-rule errors.
    pub async fn list_obligations(
        &self,
        auth: CallAuth<'_>,
        nino: &str,
        query: &ObligationQuery,
    ) -> MtdResult<Vec<Obligation>> {
        if query.from.is_some() != query.to.is_some() {
            return Err(MtdError::Validation(
                "Obligation date filters need both fromDate and toDate".into(),
            ));
        }

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(bt) = query.business_type {
            params.push(("typeOfBusiness", bt.as_str().to_string()));
        }
        if let Some(id) = &query.business_id {
            params.push(("businessId", id.clone()));
        }
        if let (Some(from), Some(to)) = (query.from, query.to) {
            params.push(("fromDate", from.to_string()));
            params.push(("toDate", to.to_string()));
        }

        let path = format!("/obligations/details/{nino}/income-and-expenditure");
        let body = not_found_as_default(
            self.execute(Method::GET, &path, ApiVersion::Obligations, auth, &params, None)
                .await
                .map(|r| r.body),
        )?;

        let parsed: ObligationsResponse = match body {
            Some(v) => serde_json::from_value(v)
                .map_err(|e| MtdError::RemoteUnknown(format!("Unexpected obligations: {e}")))?,
            None => ObligationsResponse::default(),
        };

        let mut out: Vec<Obligation> = parsed
            .obligations
            .into_iter()
            .flat_map(|b| {
                let business_id = b.business_id;
                b.obligation_details.into_iter().map(move |d| Obligation {
                    period_key: d.period_key,
                    business_id: business_id.clone(),
                    start: d.period_start_date,
                    end: d.period_end_date,
                    due: d.due_date,
                    status: if d.status.eq_ignore_ascii_case("fulfilled") {
                        ObligationStatus::Fulfilled
                    } else {
                        ObligationStatus::Open
                    },
                    received: d.received_date,
                })
            })
            .collect();
        out.sort_by_key(|o| (o.start, o.end));
        Ok(out)
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
    use serde_json::json;

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
    async fn flattens_and_sorts_obligations() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/obligations/details/AA123456A/income-and-expenditure")
                    .query_param("typeOfBusiness", "uk-property")
                    .header("accept", "application/vnd.hmrc.3.0+json");
                then.status(200).json_body(json!({
                    "obligations": [{
                        "typeOfBusiness": "uk-property",
                        "businessId": "XPIS1",
                        "obligationDetails": [
                            {"periodStartDate": "2024-07-06", "periodEndDate": "2024-10-05",
                             "dueDate": "2024-11-05", "status": "Open", "periodKey": "#002"},
                            {"periodStartDate": "2024-04-06", "periodEndDate": "2024-07-05",
                             "dueDate": "2024-08-05", "receivedDate": "2024-08-01",
                             "status": "Fulfilled", "periodKey": "#001"}
                        ]
                    }]
                }));
            })
            .await;

        let client = HmrcClient::with_base_url(server.base_url());
        let token = AccessToken::new("t");
        let headers = fraud();
        let query = ObligationQuery {
            business_type: Some(BusinessType::UkProperty),
            ..Default::default()
        };
        let obligations = client
            .list_obligations(CallAuth { token: &token, fraud_headers: &headers }, "AA123456A", &query)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(obligations.len(), 2);
        assert_eq!(obligations[0].period_key, "#001");
        assert_eq!(obligations[0].status, ObligationStatus::Fulfilled);
        assert_eq!(obligations[1].business_id.as_deref(), Some("XPIS1"));
    }

    #[tokio::test]
    async fn nothing_found_is_empty_but_bad_nino_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/obligations/details/AA123456A/income-and-expenditure");
                then.status(404)
                    .json_body(json!({"code": "NO_OBLIGATIONS_FOUND", "message": "none"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/obligations/details/BAD/income-and-expenditure");
                then.status(400)
                    .json_body(json!({"code": "FORMAT_NINO", "message": "bad"}));
            })
            .await;

        let client = HmrcClient::with_base_url(server.base_url());
        let token = AccessToken::new("t");
        let headers = fraud();
        let auth = CallAuth { token: &token, fraud_headers: &headers };

        let empty = client
            .list_obligations(auth, "AA123456A", &ObligationQuery::default())
            .await
            .unwrap();
        assert!(empty.is_empty());

        let err = client
            .list_obligations(auth, "BAD", &ObligationQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MtdError::RemoteBusinessRule { ref code, .. } if code == "FORMAT_NINO"));
    }
}
