//! Operation requests and receipts
//!
//! Each ledger operation has one tagged request type. Field-level checks
//! (positive two-decimal amounts, required identifiers, description length,
//! reference syntax) are done once, by [`LedgerRequest::validate`], before an
//! operation touches any wallet.

use super::error::LedgerError;
use super::transaction::{PaymentMethod, Reference, RequestContext, ServiceLink, TransactionId};
use super::wallet::OwnerId;
use crate::core::reference::parse_reference;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted description or refund reason
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Number of decimal places money is tracked with
pub const AMOUNT_SCALE: u32 = 2;

/// Operation kinds, used for rate limiting and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Credit,
    Debit,
    Transfer,
    Refund,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Credit => write!(f, "credit"),
            Operation::Debit => write!(f, "debit"),
            Operation::Transfer => write!(f, "transfer"),
            Operation::Refund => write!(f, "refund"),
        }
    }
}

/// Add money to a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRequest {
    pub owner_id: OwnerId,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    /// Gateway payment id; a replay with the same id is a no-op
    #[serde(default)]
    pub external_payment_id: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    pub description: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub context: RequestContext,
}

/// Spend money from a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitRequest {
    pub owner_id: OwnerId,
    pub amount: Decimal,
    pub description: String,
    #[serde(default)]
    pub service: Option<ServiceLink>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub context: RequestContext,
}

/// Move money between two wallets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub sender_owner_id: OwnerId,
    pub recipient_owner_id: OwnerId,
    pub amount: Decimal,
    pub description: String,
    #[serde(default)]
    pub context: RequestContext,
}

/// Return part or all of a completed debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Reference of the original debit
    pub reference: Reference,
    pub amount: Decimal,
    pub reason: String,
}

/// Any ledger operation, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum LedgerRequest {
    Credit(CreditRequest),
    Debit(DebitRequest),
    Transfer(TransferRequest),
    Refund(RefundRequest),
}

impl LedgerRequest {
    pub fn operation(&self) -> Operation {
        match self {
            LedgerRequest::Credit(_) => Operation::Credit,
            LedgerRequest::Debit(_) => Operation::Debit,
            LedgerRequest::Transfer(_) => Operation::Transfer,
            LedgerRequest::Refund(_) => Operation::Refund,
        }
    }

    /// Check every field of the request
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Validation` naming the first offending field, or
    /// `LedgerError::InvalidReferenceFormat` for a malformed refund reference.
    pub fn validate(&self) -> Result<(), LedgerError> {
        match self {
            LedgerRequest::Credit(req) => req.validate(),
            LedgerRequest::Debit(req) => req.validate(),
            LedgerRequest::Transfer(req) => req.validate(),
            LedgerRequest::Refund(req) => req.validate(),
        }
    }
}

impl CreditRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_owner("ownerId", &self.owner_id)?;
        validate_amount(self.amount)?;
        validate_text("description", &self.description, false)?;
        if let Some(external_id) = &self.external_payment_id {
            if external_id.trim().is_empty() {
                return Err(LedgerError::validation(
                    "externalPaymentId",
                    "must not be blank when present",
                ));
            }
        }
        Ok(())
    }
}

impl DebitRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_owner("ownerId", &self.owner_id)?;
        validate_amount(self.amount)?;
        validate_text("description", &self.description, false)?;
        if let Some(service) = &self.service {
            if service.service_id.trim().is_empty() {
                return Err(LedgerError::validation("serviceId", "must not be blank"));
            }
        }
        Ok(())
    }
}

impl TransferRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_owner("senderOwnerId", &self.sender_owner_id)?;
        validate_owner("recipientOwnerId", &self.recipient_owner_id)?;
        if self.sender_owner_id == self.recipient_owner_id {
            return Err(LedgerError::validation(
                "recipientOwnerId",
                "cannot transfer to the same wallet",
            ));
        }
        validate_amount(self.amount)?;
        validate_text("description", &self.description, false)
    }
}

impl RefundRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        parse_reference(&self.reference)?;
        validate_amount(self.amount)?;
        validate_text("reason", &self.reason, true)
    }
}

fn validate_owner(field: &str, owner_id: &str) -> Result<(), LedgerError> {
    if owner_id.trim().is_empty() {
        return Err(LedgerError::validation(field, "is required"));
    }
    Ok(())
}

/// Amounts must be positive with at most two decimal places
pub fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation(
            "amount",
            format!("must be greater than zero, got {}", amount),
        ));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::validation(
            "amount",
            format!("at most {} decimal places allowed, got {}", AMOUNT_SCALE, amount),
        ));
    }
    Ok(())
}

fn validate_text(field: &str, value: &str, required: bool) -> Result<(), LedgerError> {
    if required && value.trim().is_empty() {
        return Err(LedgerError::validation(field, "is required"));
    }
    if value.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::validation(
            field,
            format!("must be at most {} characters", MAX_DESCRIPTION_LEN),
        ));
    }
    Ok(())
}

/// Successful outcome of a ledger operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReceipt {
    pub transaction_id: TransactionId,
    pub reference: Reference,
    pub new_balance: Decimal,
    /// True when an idempotent replay returned an earlier result
    pub replayed: bool,
}

/// Both legs of a committed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub sender: OperationReceipt,
    pub recipient: OperationReceipt,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn debit(amount: Decimal) -> LedgerRequest {
        LedgerRequest::Debit(DebitRequest {
            owner_id: "user-1".to_string(),
            amount,
            description: "consultation".to_string(),
            service: None,
            metadata: None,
            context: RequestContext::default(),
        })
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::new(-100, 2))]
    #[case::three_places(Decimal::new(10001, 3))]
    fn test_invalid_amounts_rejected(#[case] amount: Decimal) {
        let err = debit(amount).validate().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[rstest]
    #[case::whole(Decimal::from(300))]
    #[case::two_places(Decimal::new(1999, 2))]
    #[case::trailing_zero(Decimal::new(12500, 3))]
    fn test_valid_amounts_accepted(#[case] amount: Decimal) {
        assert!(debit(amount).validate().is_ok());
    }

    #[test]
    fn test_self_transfer_rejected() {
        let request = LedgerRequest::Transfer(TransferRequest {
            sender_owner_id: "user-1".to_string(),
            recipient_owner_id: "user-1".to_string(),
            amount: Decimal::from(10),
            description: String::new(),
            context: RequestContext::default(),
        });

        let err = request.validate().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation { ref field, .. } if field == "recipientOwnerId"
        ));
    }

    #[test]
    fn test_refund_requires_well_formed_reference() {
        let request = LedgerRequest::Refund(RefundRequest {
            reference: "XYZ1".to_string(),
            amount: Decimal::from(10),
            reason: "cancelled".to_string(),
        });

        assert_eq!(request.validate().unwrap_err().code(), "INVALID_REFERENCE_FORMAT");
    }

    #[test]
    fn test_refund_requires_reason() {
        let request = LedgerRequest::Refund(RefundRequest {
            reference: "SRV123456ABCDEF01".to_string(),
            amount: Decimal::from(10),
            reason: "  ".to_string(),
        });

        assert!(matches!(
            request.validate().unwrap_err(),
            LedgerError::Validation { ref field, .. } if field == "reason"
        ));
    }

    #[test]
    fn test_request_deserializes_from_tagged_json() {
        let json = r#"{
            "operation": "credit",
            "ownerId": "user-7",
            "amount": "150.00",
            "paymentMethod": "upi",
            "externalPaymentId": "pay_001",
            "description": "top up"
        }"#;

        let request: LedgerRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.operation(), Operation::Credit);
        assert!(request.validate().is_ok());
    }
}
