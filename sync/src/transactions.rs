/// Pending transaction ingestion.
///
/// When a node joins the network it asks a peer for the transactions that are
/// waiting to be forged, so its own pool does not start empty.
use containers::Transaction;
use libp2p_identity::PeerId;
use metrics::SyncMetrics;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::SyncError,
    schema::{validate, FieldError, ValidationErrors, TRANSACTIONS_RESPONSE},
    types::{NetworkChannel, TransactionPool},
};

/// What happened to a batch of pending transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingTransactionsReport {
    pub received: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Fetch pending transactions from `peer_id` (or any peer) and hand them to the pool.
///
/// The whole response is checked before anything reaches the pool. Transactions the
/// pool rejects are logged and counted, never resubmitted.
pub async fn fetch_pending_transactions(
    channel: &dyn NetworkChannel,
    pool: &dyn TransactionPool,
    procedure: &str,
    peer_id: Option<&PeerId>,
    metrics: Option<&SyncMetrics>,
) -> Result<PendingTransactionsReport, SyncError> {
    let response = channel
        .invoke_from_network(procedure, peer_id, Value::Null)
        .await?;
    let peer = response.peer_id.or_else(|| peer_id.copied());

    validate(&TRANSACTIONS_RESPONSE, &response.data).map_err(|errors| SyncError::Schema {
        schema: TRANSACTIONS_RESPONSE.id,
        errors,
    })?;

    let transactions = decode_transactions(&response.data)?;

    debug!(
        peer = ?peer,
        num_transactions = transactions.len(),
        "Received pending transactions"
    );

    let mut report = PendingTransactionsReport {
        received: transactions.len(),
        ..Default::default()
    };

    for transaction in transactions {
        let id = transaction.id;
        let result = pool.add(transaction).await;
        if result.is_ok() {
            report.accepted += 1;
        } else {
            report.rejected += 1;
            warn!(
                transaction_id = %id,
                errors = ?result.errors,
                "Transaction pool rejected pending transaction"
            );
        }
    }

    if let Some(metrics) = metrics {
        metrics.inc_pending_transactions("accepted", report.accepted as u64);
        metrics.inc_pending_transactions("rejected", report.rejected as u64);
    }

    info!(
        peer = ?peer,
        received = report.received,
        accepted = report.accepted,
        rejected = report.rejected,
        "Loaded pending transactions from network"
    );

    Ok(report)
}

fn decode_transactions(data: &Value) -> Result<Vec<Transaction>, SyncError> {
    let entries = data
        .get("transactions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut transactions = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let decoded = entry
            .as_str()
            .map(Transaction::from_hex)
            .transpose()
            .map_err(|err| err.to_string());
        match decoded {
            Ok(Some(transaction)) => transactions.push(transaction),
            Ok(None) => errors.push(FieldError::new(
                format!("transactions[{index}]"),
                "should be string",
            )),
            Err(message) => errors.push(FieldError::new(format!("transactions[{index}]"), message)),
        }
    }

    if errors.is_empty() {
        Ok(transactions)
    } else {
        Err(SyncError::Schema {
            schema: TRANSACTIONS_RESPONSE.id,
            errors: ValidationErrors::new(errors),
        })
    }
}
