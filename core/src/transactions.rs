//! Transaction view of orders: every order is a sale or a credit/refund.

use crate::{
    error::{RetentionError, RetentionResult},
    types::{CustomerId, OrderId},
    validity_gate::Order,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    CreditOrRefund,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub order_id:       OrderId,
    pub order_ts:       NaiveDateTime,
    pub customer_id:    CustomerId,
    pub kind:           TransactionKind,
    /// Always non-negative: |net| for credits, max(net, 0) for sales.
    pub amount_proxy:   f64,
}

pub fn build_transactions(orders: &[Order]) -> Vec<Transaction> {
    let mut out: Vec<Transaction> = orders
        .iter()
        .map(|o| {
            let (kind, amount_proxy) = if o.is_credit_like {
                (TransactionKind::CreditOrRefund, o.order_net_proxy.abs())
            } else {
                (TransactionKind::Sale, o.order_net_proxy.max(0.0))
            };
            Transaction {
                transaction_id: o.order_id.clone(),
                order_id:       o.order_id.clone(),
                order_ts:       o.order_ts,
                customer_id:    o.customer_id.clone(),
                kind,
                amount_proxy,
            }
        })
        .collect();
    out.sort_by(|a, b| a.order_ts.cmp(&b.order_ts).then_with(|| a.transaction_id.cmp(&b.transaction_id)));
    out
}

/// Sales never carry a negative amount, and every transaction's kind
/// matches its order's credit flag.
pub fn check_transactions(orders: &[Order], transactions: &[Transaction]) -> RetentionResult<()> {
    if orders.len() != transactions.len() {
        return Err(RetentionError::ValidityGate(format!(
            "transactions ({}) do not cover orders ({}) one-to-one",
            transactions.len(),
            orders.len()
        )));
    }
    let credit_by_order: std::collections::HashMap<&str, bool> =
        orders.iter().map(|o| (o.order_id.as_str(), o.is_credit_like)).collect();
    for tx in transactions {
        if tx.kind == TransactionKind::Sale && tx.amount_proxy < 0.0 {
            return Err(RetentionError::ValidityGate(format!(
                "sale {} has negative amount {}",
                tx.transaction_id, tx.amount_proxy
            )));
        }
        let credit_like = credit_by_order.get(tx.order_id.as_str()).copied().ok_or_else(|| {
            RetentionError::ValidityGate(format!("transaction {} has no order", tx.transaction_id))
        })?;
        if credit_like != (tx.kind == TransactionKind::CreditOrRefund) {
            return Err(RetentionError::ValidityGate(format!(
                "transaction {} kind={:?} contradicts is_credit_like={}",
                tx.transaction_id, tx.kind, credit_like
            )));
        }
    }
    Ok(())
}
