//! Decoding and validation of UPI payment notifications.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;

use crate::{
    Error,
    expense::{DEFAULT_CATEGORY, DEFAULT_CURRENCY, DEFAULT_STATUS, Expense, ExpenseBuilder},
    timestamp::parse_timestamp,
};

const MAX_TRANSACTION_ID_LENGTH: usize = 200;
const MAX_UPI_ID_LENGTH: usize = 200;
const MAX_MERCHANT_NAME_LENGTH: usize = 200;
const MAX_CURRENCY_LENGTH: usize = 50;
const MAX_DESCRIPTION_LENGTH: usize = 500;
const MAX_CATEGORY_LENGTH: usize = 100;
const MAX_STATUS_LENGTH: usize = 50;

/// Amounts are stored with 18 significant digits, two of them after the decimal point.
const MAX_AMOUNT_INTEGER_DIGITS: u32 = 16;

/// A problem with one field of a payment notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// The name of the field as it appears in the notification, e.g. "amount".
    pub field: &'static str,
    /// What is wrong with the field.
    pub message: String,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A payment notification as sent by the payment provider.
///
/// Every field is optional at this stage so that missing fields can be
/// reported as validation errors rather than decoding errors.
/// Field names are matched case-insensitively.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct PaymentNotification {
    /// The payment provider's ID for the transaction.
    #[serde(default, rename = "transactionid")]
    pub transaction_id: Option<String>,
    /// The UPI ID of the payer.
    #[serde(default, rename = "upiid")]
    pub upi_id: Option<String>,
    /// Who was paid.
    #[serde(default, rename = "merchantname")]
    pub merchant_name: Option<String>,
    /// The amount paid, as written in the notification.
    #[serde(default)]
    pub amount: Option<Number>,
    /// The currency code of the amount.
    #[serde(default)]
    pub currency: Option<String>,
    /// What the payment was for.
    #[serde(default)]
    pub description: Option<String>,
    /// The category of the expense.
    #[serde(default)]
    pub category: Option<String>,
    /// When the payment happened.
    #[serde(default, rename = "transactiondate")]
    pub transaction_date: Option<String>,
    /// The payment status.
    #[serde(default)]
    pub status: Option<String>,
}

impl PaymentNotification {
    /// Decode a notification from its JSON text.
    ///
    /// # Errors
    /// Returns [Error::MalformedPayload] if `raw_payload` is not a JSON object
    /// or if a field has the wrong JSON type, e.g. a string for `amount`.
    pub fn parse(raw_payload: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(raw_payload)
            .map_err(|error| Error::MalformedPayload(error.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(Error::MalformedPayload(
                "expected a JSON object".to_owned(),
            ));
        };

        let fields: Map<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name.to_lowercase(), value))
            .collect();

        serde_json::from_value(Value::Object(fields))
            .map_err(|error| Error::MalformedPayload(error.to_string()))
    }

    /// Check every field and convert the notification into an [ExpenseBuilder].
    ///
    /// Omitted or blank optional fields fall back to their defaults. The
    /// amount is rounded to two decimal places before it is checked.
    ///
    /// # Errors
    /// Returns [Error::Validation] listing every invalid field.
    pub fn validate(self) -> Result<ExpenseBuilder, Error> {
        let mut errors = Vec::new();

        let transaction_id = required_text(
            "transactionId",
            self.transaction_id,
            MAX_TRANSACTION_ID_LENGTH,
            &mut errors,
        );
        let upi_id = required_text("upiId", self.upi_id, MAX_UPI_ID_LENGTH, &mut errors);
        let merchant_name = required_text(
            "merchantName",
            self.merchant_name,
            MAX_MERCHANT_NAME_LENGTH,
            &mut errors,
        );
        let amount = validate_amount(self.amount, &mut errors);
        let transaction_date = validate_transaction_date(self.transaction_date, &mut errors);
        let currency = optional_text("currency", self.currency, MAX_CURRENCY_LENGTH, &mut errors);
        let category = optional_text("category", self.category, MAX_CATEGORY_LENGTH, &mut errors);
        let status = optional_text("status", self.status, MAX_STATUS_LENGTH, &mut errors);
        let description = optional_text(
            "description",
            self.description,
            MAX_DESCRIPTION_LENGTH,
            &mut errors,
        );

        match (
            transaction_id,
            upi_id,
            merchant_name,
            amount,
            transaction_date,
        ) {
            (
                Some(transaction_id),
                Some(upi_id),
                Some(merchant_name),
                Some(amount),
                Some(transaction_date),
            ) if errors.is_empty() => Ok(Expense::build(
                &transaction_id,
                &upi_id,
                &merchant_name,
                amount,
                transaction_date,
            )
            .currency(currency.as_deref().unwrap_or(DEFAULT_CURRENCY))
            .category(category.as_deref().unwrap_or(DEFAULT_CATEGORY))
            .status(status.as_deref().unwrap_or(DEFAULT_STATUS))
            .description(description)),
            _ => Err(Error::Validation(errors)),
        }
    }
}

fn required_text(
    field: &'static str,
    value: Option<String>,
    max_length: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        None => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(text) if text.trim().is_empty() => {
            errors.push(FieldError::new(field, "must not be empty"));
            None
        }
        Some(text) => check_length(field, text, max_length, errors),
    }
}

fn optional_text(
    field: &'static str,
    value: Option<String>,
    max_length: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        Some(text) if !text.trim().is_empty() => check_length(field, text, max_length, errors),
        _ => None,
    }
}

fn check_length(
    field: &'static str,
    text: String,
    max_length: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    if text.chars().count() > max_length {
        errors.push(FieldError::new(
            field,
            format!("must be at most {max_length} characters"),
        ));
        return None;
    }

    Some(text)
}

fn validate_amount(amount: Option<Number>, errors: &mut Vec<FieldError>) -> Option<Decimal> {
    let Some(amount) = amount else {
        errors.push(FieldError::new("amount", "is required"));
        return None;
    };

    let text = amount.to_string();
    let Ok(amount) = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)) else {
        errors.push(FieldError::new("amount", "must be a valid decimal number"));
        return None;
    };

    let amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);

    if amount <= Decimal::ZERO {
        errors.push(FieldError::new("amount", "must be greater than 0"));
        return None;
    }

    let upper_bound = Decimal::from(10_i64.pow(MAX_AMOUNT_INTEGER_DIGITS));
    if amount >= upper_bound {
        errors.push(FieldError::new(
            "amount",
            format!("must be less than {upper_bound}"),
        ));
        return None;
    }

    Some(amount)
}

fn validate_transaction_date(
    transaction_date: Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<OffsetDateTime> {
    let Some(transaction_date) = transaction_date else {
        errors.push(FieldError::new("transactionDate", "is required"));
        return None;
    };

    let parsed = parse_timestamp(&transaction_date);

    if parsed.is_none() {
        errors.push(FieldError::new(
            "transactionDate",
            "must be a valid date or timestamp",
        ));
    }

    parsed
}


#[cfg(test)]
mod validate_tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use crate::{
        Error,
        expense::{FieldError, PaymentNotification},
    };

    fn validate(raw: &str) -> Result<crate::expense::ExpenseBuilder, Error> {
        PaymentNotification::parse(raw).unwrap().validate()
    }

    #[track_caller]
    fn assert_field_errors(raw: &str, want_fields: &[&str]) {
        match validate(raw) {
            Err(Error::Validation(errors)) => {
                let got_fields: Vec<&str> = errors.iter().map(|error| error.field).collect();
                assert_eq!(got_fields, want_fields, "unexpected field errors: {errors:?}");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_notification_gets_defaults() {
        let builder = validate(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 100.50, "transactionDate": "2024-01-01"}"#,
        )
        .unwrap();

        assert_eq!(builder.transaction_id, "TX1");
        assert_eq!(builder.amount, dec!(100.50));
        assert_eq!(builder.currency, "INR");
        assert_eq!(builder.category, "Others");
        assert_eq!(builder.status, "Success");
        assert_eq!(builder.description, None);
        assert_eq!(builder.transaction_date, datetime!(2024-01-01 0:00 UTC));
    }

    #[test]
    fn optional_fields_are_copied() {
        let builder = validate(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 12, "transactionDate": "2024-01-01T09:30:00Z", "currency": "USD",
                "description": "Lunch", "category": "Food", "status": "Pending"}"#,
        )
        .unwrap();

        assert_eq!(builder.currency, "USD");
        assert_eq!(builder.category, "Food");
        assert_eq!(builder.status, "Pending");
        assert_eq!(builder.description.as_deref(), Some("Lunch"));
    }

    #[test]
    fn blank_optional_fields_use_defaults() {
        let builder = validate(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 12, "transactionDate": "2024-01-01", "currency": " ", "category": ""}"#,
        )
        .unwrap();

        assert_eq!(builder.currency, "INR");
        assert_eq!(builder.category, "Others");
    }

    #[test]
    fn reports_every_missing_required_field() {
        assert_field_errors(
            "{}",
            &[
                "transactionId",
                "upiId",
                "merchantName",
                "amount",
                "transactionDate",
            ],
        );
    }

    #[test]
    fn blank_required_field_is_invalid() {
        let result = validate(
            r#"{"transactionId": "  ", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 1, "transactionDate": "2024-01-01"}"#,
        );

        assert_eq!(
            result,
            Err(Error::Validation(vec![FieldError::new(
                "transactionId",
                "must not be empty"
            )]))
        );
    }

    #[test]
    fn negative_amount_is_invalid() {
        assert_field_errors(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": -5, "transactionDate": "2024-01-01"}"#,
            &["amount"],
        );
    }

    #[test]
    fn zero_amount_is_invalid() {
        assert_field_errors(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 0, "transactionDate": "2024-01-01"}"#,
            &["amount"],
        );
    }

    #[test]
    fn amount_rounding_to_zero_is_invalid() {
        assert_field_errors(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 0.004, "transactionDate": "2024-01-01"}"#,
            &["amount"],
        );
    }

    #[test]
    fn amount_is_rounded_to_two_decimal_places() {
        let builder = validate(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 10.125, "transactionDate": "2024-01-01"}"#,
        )
        .unwrap();

        assert_eq!(builder.amount, dec!(10.13));
    }

    #[test]
    fn huge_amount_is_invalid() {
        assert_field_errors(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 100000000000000000, "transactionDate": "2024-01-01"}"#,
            &["amount"],
        );
    }

    #[test]
    fn amount_at_upper_bound_is_invalid() {
        assert_field_errors(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 10000000000000000, "transactionDate": "2024-01-01"}"#,
            &["amount"],
        );
    }

    #[test]
    fn amounts_with_sixteen_integer_digits_keep_every_digit() {
        for (text, want) in [
            ("1234567890123456.78", dec!(1234567890123456.78)),
            ("9999999999999999.99", dec!(9999999999999999.99)),
            ("9007199254740993", dec!(9007199254740993)),
        ] {
            let builder = validate(&format!(
                r#"{{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                    "amount": {text}, "transactionDate": "2024-01-01"}}"#
            ))
            .expect("amount should be valid");

            assert_eq!(builder.amount, want, "amount {text}");
        }
    }

    #[test]
    fn amount_in_exponent_notation_is_accepted() {
        let builder = validate(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 1.5e3, "transactionDate": "2024-01-01"}"#,
        )
        .expect("amount should be valid");

        assert_eq!(builder.amount, dec!(1500));
    }

    #[test]
    fn unparseable_transaction_date_is_invalid() {
        assert_field_errors(
            r#"{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "Shop",
                "amount": 1, "transactionDate": "last tuesday"}"#,
            &["transactionDate"],
        );
    }

    #[test]
    fn overlong_fields_are_invalid() {
        let long_name = "x".repeat(201);
        let long_description = "y".repeat(501);
        let raw = format!(
            r#"{{"transactionId": "TX1", "upiId": "a@bank", "merchantName": "{long_name}",
                "amount": 1, "transactionDate": "2024-01-01", "description": "{long_description}"}}"#
        );

        assert_field_errors(&raw, &["merchantName", "description"]);
    }
}
