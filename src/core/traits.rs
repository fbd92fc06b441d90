//! Collaborator-facing traits
//!
//! Systems outside the ledger talk to it through these narrow interfaces:
//! a payment gateway reports confirmed payments to a [`PaymentEventSink`],
//! and booking or calling services charge and refund through
//! [`ServiceBilling`]. [`LedgerEngine`] implements both.

use crate::core::engine::LedgerEngine;
use crate::types::{
    CreditRequest, DebitRequest, LedgerError, OperationReceipt, OwnerId, PaymentMethod,
    RefundRequest, RequestContext, ServiceLink,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// A payment the gateway has confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub owner_id: OwnerId,
    /// Gateway payment id; delivering the same event twice credits once
    pub external_id: String,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub gateway_metadata: serde_json::Value,
}

/// Receiver of confirmed gateway payments
pub trait PaymentEventSink {
    /// Credit the payment to the owner's wallet
    ///
    /// Redelivery of an already recorded event returns the original receipt
    /// with `replayed = true`.
    fn payment_confirmed(
        &self,
        event: PaymentEvent,
    ) -> impl Future<Output = Result<OperationReceipt, LedgerError>> + Send;
}

/// Charging interface for platform services
pub trait ServiceBilling {
    /// Charge `amount` to the owner's wallet for a service
    fn deduct(
        &self,
        owner_id: &str,
        amount: Decimal,
        description: &str,
        service: ServiceLink,
    ) -> impl Future<Output = Result<OperationReceipt, LedgerError>> + Send;

    /// Return part or all of an earlier charge
    fn refund(
        &self,
        reference: &str,
        amount: Decimal,
        reason: &str,
    ) -> impl Future<Output = Result<OperationReceipt, LedgerError>> + Send;
}

impl PaymentEventSink for LedgerEngine {
    async fn payment_confirmed(
        &self,
        event: PaymentEvent,
    ) -> Result<OperationReceipt, LedgerError> {
        let metadata = if event.gateway_metadata.is_null() {
            None
        } else {
            Some(event.gateway_metadata)
        };

        self.credit(CreditRequest {
            description: format!("Wallet top-up via {}", event.method),
            owner_id: event.owner_id,
            amount: event.amount,
            payment_method: event.method,
            external_payment_id: Some(event.external_id),
            gateway: event.gateway,
            metadata,
            context: RequestContext::default(),
        })
        .await
    }
}

impl ServiceBilling for LedgerEngine {
    async fn deduct(
        &self,
        owner_id: &str,
        amount: Decimal,
        description: &str,
        service: ServiceLink,
    ) -> Result<OperationReceipt, LedgerError> {
        self.debit(DebitRequest {
            owner_id: owner_id.to_string(),
            amount,
            description: description.to_string(),
            service: Some(service),
            metadata: None,
            context: RequestContext::default(),
        })
        .await
    }

    async fn refund(
        &self,
        reference: &str,
        amount: Decimal,
        reason: &str,
    ) -> Result<OperationReceipt, LedgerError> {
        LedgerEngine::refund(
            self,
            RefundRequest {
                reference: reference.to_string(),
                amount,
                reason: reason.to_string(),
            },
        )
        .await
    }
}
