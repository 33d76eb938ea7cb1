//! §4.14 Reconciler: runs at startup and nightly. Compares OPEN positions in
//! the store against the broker's live portfolio and reports both
//! directions of mismatch; never creates a Position on its own (a
//! broker-only leg needs human inspection).

use crate::domain::errors::BrokerError;
use crate::domain::ports::{BrokerAdapter, Notifier, NotifierEvent, Store};
use crate::domain::types::{ExitReason, Position, PositionStatus};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Reconciler {
    broker: Arc<dyn BrokerAdapter>,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub closed_externally: Vec<Position>,
    pub new_in_broker: Vec<(String, i64)>,
}

impl Reconciler {
    pub fn new(broker: Arc<dyn BrokerAdapter>, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { broker, store, notifier }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, BrokerError> {
        let open_positions = self.store.open_positions().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to read open positions, reconciling against an empty set");
            Vec::new()
        });
        let portfolio = self.broker.portfolio().await?;

        let mut report = ReconcileReport::default();

        for position in &open_positions {
            let has_all_legs = position.legs.iter().all(|leg| {
                portfolio
                    .iter()
                    .any(|p| p.con_id == leg.con_id && p.symbol == position.symbol && p.strike == leg.strike && p.right == leg.option_type && p.expiration == position.expiration)
            });
            if !has_all_legs {
                if let Err(e) = self
                    .store
                    .mark_position_closed(position.id, PositionStatus::ClosedExternally, None, Some(ExitReason::Reconciliation), None)
                    .await
                {
                    warn!(position_id = %position.id, error = %e, "failed to mark position CLOSED_EXTERNALLY");
                    continue;
                }
                report.closed_externally.push(position.clone());
            }
        }

        let tracked_con_ids: std::collections::HashSet<i64> = open_positions.iter().flat_map(|p| p.legs.iter().map(|l| l.con_id)).collect();
        for leg in portfolio.iter().filter(|p| !tracked_con_ids.contains(&p.con_id)) {
            if let Err(e) = self.store.log_new_in_broker_diff(&leg.symbol, leg.con_id, Utc::now()).await {
                warn!(symbol = %leg.symbol, con_id = leg.con_id, error = %e, "failed to persist new-in-broker diff");
            }
            report.new_in_broker.push((leg.symbol.clone(), leg.con_id));
        }

        info!(
            closed_externally = report.closed_externally.len(),
            new_in_broker = report.new_in_broker.len(),
            "reconciliation complete"
        );
        self.notifier
            .publish(NotifierEvent::ReconciliationDiff {
                closed_externally: report.closed_externally.len(),
                new_in_broker: report.new_in_broker.len(),
            })
            .await;

        Ok(report)
    }
}
