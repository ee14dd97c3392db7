//! Submission adapter.
//!
//! Validates a payload, obtains a token, composes fraud headers, resolves
//! the wire business id, sends the summary with the protocol chosen by the
//! tax year, and records what was sent in the ledger.
//!
//! Submissions for the same user, business and period are serialised. Once
//! the remote call starts it runs on its own task together with the ledger
//! write, so a caller going away cannot leave a filing unrecorded.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{MtdError, MtdResult};
use crate::fraud_headers::{ClientHeaders, FraudHeaderComposer, HeaderPolicy, RequestContext};
use crate::hmrc::obligations::ObligationQuery;
use crate::hmrc::{BusinessIdResolver, CallAuth, HmrcClient, SummaryTarget, wire};
use crate::keyed_lock::KeyedLocks;
use crate::models::{BusinessType, Obligation, SubmissionRecord, SubmissionState};
use crate::payload::SubmissionPayload;
use crate::store::SubmissionLedger;
use crate::tax_year::{SubmissionProtocol, TaxYear};
use crate::tokens::TokenManager;
use crate::translate::DUPLICATE_SUBMISSION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub user_id: String,
    /// National Insurance number of the taxpayer.
    pub nino: String,
    pub business_id: String,
    pub business_type: BusinessType,
    pub tax_year: TaxYear,
    pub payload: SubmissionPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub success: bool,
    /// HMRC's id for the submission (`periodId` for period summaries).
    pub submission_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub protocol: SubmissionProtocol,
    pub state: SubmissionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

type SubmissionKey = (String, String, TaxYear, NaiveDate, NaiveDate);

#[derive(Clone)]
pub struct SubmissionAdapter {
    client: HmrcClient,
    tokens: Arc<TokenManager>,
    composer: FraudHeaderComposer,
    resolver: Arc<dyn BusinessIdResolver>,
    ledger: Arc<dyn SubmissionLedger>,
    locks: KeyedLocks<SubmissionKey>,
}

impl SubmissionAdapter {
    pub fn new(
        client: HmrcClient,
        tokens: Arc<TokenManager>,
        composer: FraudHeaderComposer,
        resolver: Arc<dyn BusinessIdResolver>,
        ledger: Arc<dyn SubmissionLedger>,
    ) -> Self {
        Self {
            client,
            tokens,
            composer,
            resolver,
            ledger,
            locks: KeyedLocks::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<dyn SubmissionLedger> {
        &self.ledger
    }

    /// Submission keys currently locked or awaited.
    pub fn active_submissions(&self) -> usize {
        self.locks.len()
    }

    /// Submit with the period protocol; rejects cumulative tax years.
    pub async fn submit_period(
        &self,
        req: SubmissionRequest,
        client_headers: &ClientHeaders,
        ctx: &RequestContext,
    ) -> MtdResult<SubmissionOutcome> {
        expect_protocol(req.tax_year, SubmissionProtocol::Period)?;
        self.submit(req, client_headers, ctx).await
    }

    /// Submit with the cumulative protocol; rejects period tax years.
    pub async fn submit_cumulative(
        &self,
        req: SubmissionRequest,
        client_headers: &ClientHeaders,
        ctx: &RequestContext,
    ) -> MtdResult<SubmissionOutcome> {
        expect_protocol(req.tax_year, SubmissionProtocol::Cumulative)?;
        self.submit(req, client_headers, ctx).await
    }

    pub async fn submit(
        &self,
        req: SubmissionRequest,
        client_headers: &ClientHeaders,
        ctx: &RequestContext,
    ) -> MtdResult<SubmissionOutcome> {
        let protocol = req.tax_year.protocol();
        req.payload
            .validate(req.business_type, req.tax_year, protocol)?;
        let fraud_headers = self
            .composer
            .compose(client_headers, ctx, HeaderPolicy::Strict)?;

        let period_start = req.payload.period_start;
        let period_end = req.payload.period_end;
        let key = (
            req.user_id.clone(),
            req.business_id.clone(),
            req.tax_year,
            period_start,
            period_end,
        );
        let guard = self.locks.acquire(key).await;

        let previous = match protocol {
            SubmissionProtocol::Period => {
                self.ledger
                    .latest_for(
                        &req.user_id,
                        &req.business_id,
                        req.tax_year,
                        period_start,
                        period_end,
                    )
                    .await?
            }
            SubmissionProtocol::Cumulative => {
                self.ledger
                    .latest_for_tax_year(&req.user_id, &req.business_id, req.tax_year, protocol)
                    .await?
            }
        };

        let prior_state = if previous.is_some() {
            SubmissionState::Submitted
        } else {
            SubmissionState::NotSubmitted
        };
        if let (SubmissionProtocol::Period, Some(existing)) = (protocol, previous) {
            info!(
                user_id = %req.user_id,
                business_id = %req.business_id,
                tax_year = %req.tax_year,
                %period_start,
                %period_end,
                "period already filed, not resubmitting"
            );
            return Ok(SubmissionOutcome {
                success: true,
                submission_id: existing.remote_submission_id,
                submitted_at: existing.submitted_at,
                protocol,
                state: SubmissionState::Submitted,
                warning: Some("This period has already been submitted to HMRC.".into()),
            });
        }

        let token = self.tokens.get_valid_token(&req.user_id).await?;
        let auth = CallAuth {
            token: &token,
            fraud_headers: &fraud_headers,
        };
        let remote_business_id = self
            .resolver
            .resolve(auth, &req.nino, req.business_type, &req.business_id)
            .await?;
        let body = wire::render(&req.payload, req.business_type, protocol);

        let client = self.client.clone();
        let ledger = self.ledger.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let auth = CallAuth {
                token: &token,
                fraud_headers: &fraud_headers,
            };
            let target = SummaryTarget {
                nino: &req.nino,
                business_id: &remote_business_id,
                business_type: req.business_type,
                tax_year: req.tax_year,
            };
            info!(
                user_id = %req.user_id,
                business_id = %req.business_id,
                remote_business_id = %remote_business_id,
                business_type = %req.business_type,
                tax_year = %req.tax_year,
                %period_start,
                %period_end,
                %protocol,
                "submitting to HMRC"
            );

            let (remote_submission_id, warning) =
                match client.send_summary(auth, target, protocol, &body).await {
                    Ok(resp) => (resp.submission_id(), None),
                    Err(MtdError::RemoteBusinessRule { code, message, .. })
                        if protocol == SubmissionProtocol::Period && code == DUPLICATE_SUBMISSION =>
                    {
                        warn!(
                            user_id = %req.user_id,
                            business_id = %req.business_id,
                            tax_year = %req.tax_year,
                            %period_start,
                            %period_end,
                            "HMRC reports duplicate period; treating as submitted"
                        );
                        (None, Some(message))
                    }
                    Err(e) => {
                        error!(
                            user_id = %req.user_id,
                            business_id = %req.business_id,
                            tax_year = %req.tax_year,
                            %period_start,
                            %period_end,
                            %protocol,
                            code = e.code(),
                            error = %e,
                            "HMRC submission failed"
                        );
                        return Err(e);
                    }
                };

            let record = SubmissionRecord {
                id: Uuid::now_v7(),
                user_id: req.user_id.clone(),
                business_id: req.business_id.clone(),
                remote_business_id,
                business_type: req.business_type,
                tax_year: req.tax_year,
                submission_type: protocol,
                period_start,
                period_end,
                payload: body,
                submitted_at: Utc::now(),
                remote_submission_id,
            };
            if let Err(e) = ledger.record(&record).await {
                error!(
                    ledger_id = %record.id,
                    user_id = %record.user_id,
                    business_id = %record.business_id,
                    tax_year = %record.tax_year,
                    payload = %record.payload,
                    error = %e,
                    "HMRC accepted submission but ledger write failed"
                );
                return Err(e);
            }

            let state = prior_state.advance(protocol);
            info!(
                ledger_id = %record.id,
                user_id = %record.user_id,
                business_id = %record.business_id,
                tax_year = %record.tax_year,
                remote_submission_id = ?record.remote_submission_id,
                state = ?state,
                "HMRC submission recorded"
            );
            Ok(SubmissionOutcome {
                success: true,
                submission_id: record.remote_submission_id,
                submitted_at: record.submitted_at,
                protocol,
                state,
                warning,
            })
        });

        task.await
            .map_err(|e| MtdError::Internal(format!("Submission task failed: {e}")))?
    }

    /// Obligations for the user. Read-only, so fraud headers are lenient.
    pub async fn obligations(
        &self,
        user_id: &str,
        nino: &str,
        query: &ObligationQuery,
        client_headers: &ClientHeaders,
        ctx: &RequestContext,
    ) -> MtdResult<Vec<Obligation>> {
        let fraud_headers = self
            .composer
            .compose(client_headers, ctx, HeaderPolicy::Lenient)?;
        let token = self.tokens.get_valid_token(user_id).await?;
        let auth = CallAuth {
            token: &token,
            fraud_headers: &fraud_headers,
        };
        self.client.list_obligations(auth, nino, query).await
    }

    /// HMRC's current year-to-date summary, if any.
    pub async fn remote_cumulative(
        &self,
        user_id: &str,
        nino: &str,
        business_type: BusinessType,
        business_id: &str,
        tax_year: TaxYear,
        client_headers: &ClientHeaders,
        ctx: &RequestContext,
    ) -> MtdResult<Option<serde_json::Value>> {
        let fraud_headers = self
            .composer
            .compose(client_headers, ctx, HeaderPolicy::Lenient)?;
        let token = self.tokens.get_valid_token(user_id).await?;
        let auth = CallAuth {
            token: &token,
            fraud_headers: &fraud_headers,
        };
        let remote_business_id = self
            .resolver
            .resolve(auth, nino, business_type, business_id)
            .await?;
        self.client
            .retrieve_cumulative(
                auth,
                SummaryTarget {
                    nino,
                    business_id: &remote_business_id,
                    business_type,
                    tax_year,
                },
            )
            .await
    }
}

fn expect_protocol(tax_year: TaxYear, expected: SubmissionProtocol) -> MtdResult<()> {
    let actual = tax_year.protocol();
    if actual == expected {
        Ok(())
    } else {
        Err(MtdError::Validation(format!(
            "Tax year {tax_year} is reported with {actual} summaries, not {expected}"
        )))
    }
}
