//! Validation of extraction-service output into typed transactions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ExtractionError;
use crate::domain::foundation::{BudgetId, Money};

/// A budget the extraction service may assign transactions to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCandidate {
    pub id: BudgetId,
    pub name: String,
}

/// What the user handed to the extraction service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionInput {
    /// Free text such as "spent $45 on groceries yesterday".
    Text(String),
    /// A receipt photo.
    Receipt { bytes: Vec<u8>, media_type: String },
}

/// One validated transaction proposed by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedTransaction {
    pub description: String,
    pub amount: Money,
    pub date: NaiveDate,
    pub budget_id: BudgetId,
}

const DESCRIPTION_KEYS: [&str; 2] = ["description", "Description"];
const AMOUNT_KEYS: [&str; 2] = ["amount", "Amount"];
const DATE_KEYS: [&str; 2] = ["date", "Date"];
const BUDGET_ID_KEYS: [&str; 3] = ["budgetId", "BudgetID", "budget_id"];

/// Parses and validates a raw extraction response.
///
/// Expects `{"transactions": [...]}`. Each transaction needs a non-empty
/// description, a positive numeric amount, a `YYYY-MM-DD` date and the id
/// of one of `candidates`. The first invalid transaction fails the whole
/// response; nothing partial is returned.
pub fn parse_extraction_response(
    raw: &str,
    candidates: &[BudgetCandidate],
) -> Result<Vec<ExtractedTransaction>, ExtractionError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ExtractionError::Malformed(format!("response is not valid JSON: {}", e)))?;
    validate_extraction_value(&value, candidates)
}

/// Same as [`parse_extraction_response`] for an already-decoded value.
pub fn validate_extraction_value(
    value: &Value,
    candidates: &[BudgetCandidate],
) -> Result<Vec<ExtractedTransaction>, ExtractionError> {
    let transactions = value
        .get("transactions")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractionError::Malformed("missing transactions array".to_string()))?;

    if transactions.is_empty() {
        return Err(ExtractionError::NoTransactions);
    }

    transactions
        .iter()
        .enumerate()
        .map(|(index, tx)| validate_transaction(index, tx, candidates))
        .collect()
}

/// Walks the value by hand rather than deserializing into a struct: field
/// names come in several spellings, and each failure must name the field
/// and the transaction index it came from.
fn validate_transaction(
    index: usize,
    tx: &Value,
    candidates: &[BudgetCandidate],
) -> Result<ExtractedTransaction, ExtractionError> {
    let fields = tx
        .as_object()
        .ok_or_else(|| ExtractionError::Malformed(format!("transaction {} is not an object", index)))?;

    let description = lookup(fields, &DESCRIPTION_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ExtractionError::MissingField {
            index,
            field: "description",
        })?;

    let amount = match lookup(fields, &AMOUNT_KEYS) {
        None => {
            return Err(ExtractionError::MissingField {
                index,
                field: "amount",
            })
        }
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(Money::from_major)
            .ok_or(ExtractionError::InvalidAmount {
                index,
                reason: "amount is out of range",
            })?,
        Some(_) => {
            return Err(ExtractionError::InvalidAmount {
                index,
                reason: "amount must be a number",
            })
        }
    };
    if !amount.is_positive() {
        return Err(ExtractionError::InvalidAmount {
            index,
            reason: "amount must be positive",
        });
    }
    if amount > Money::MAX_AMOUNT {
        return Err(ExtractionError::InvalidAmount {
            index,
            reason: "amount is too large",
        });
    }

    let date = lookup(fields, &DATE_KEYS)
        .and_then(Value::as_str)
        .and_then(parse_iso_date)
        .ok_or(ExtractionError::InvalidDate { index })?;

    let raw_budget_id = lookup(fields, &BUDGET_ID_KEYS)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(ExtractionError::MissingField {
            index,
            field: "budgetId",
        })?;
    let budget_id = raw_budget_id
        .parse::<BudgetId>()
        .ok()
        .filter(|id| candidates.iter().any(|c| c.id == *id))
        .ok_or_else(|| ExtractionError::UnknownBudget {
            index,
            budget_id: raw_budget_id.to_string(),
        })?;

    Ok(ExtractedTransaction {
        description: description.to_string(),
        amount,
        date,
        budget_id,
    })
}

fn lookup<'a>(fields: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| fields.get(*k))
}

/// Strict `YYYY-MM-DD`.
fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidates() -> Vec<BudgetCandidate> {
        vec![BudgetCandidate {
            id: BudgetId::new(),
            name: "Groceries".to_string(),
        }]
    }

    fn response(tx: Value) -> String {
        json!({ "transactions": [tx] }).to_string()
    }

    #[test]
    fn accepts_camel_case_field_names() {
        let c = candidates();
        let raw = response(json!({
            "description": "Coffee",
            "amount": 3.50,
            "date": "2024-01-01",
            "budgetId": c[0].id.to_string(),
        }));

        let txs = parse_extraction_response(&raw, &c).unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].description, "Coffee");
        assert_eq!(txs[0].amount, Money::from_cents(350));
        assert_eq!(txs[0].date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(txs[0].budget_id, c[0].id);
    }

    #[test]
    fn accepts_capitalised_field_names() {
        let c = candidates();
        let raw = response(json!({
            "Description": "Bread",
            "Amount": 2,
            "Date": "2024-02-10",
            "Budget": "Groceries",
            "BudgetID": c[0].id.to_string(),
        }));

        let txs = parse_extraction_response(&raw, &c).unwrap();
        assert_eq!(txs[0].amount, Money::from_cents(200));
    }

    #[test]
    fn string_amount_is_an_amount_type_error() {
        let c = candidates();
        let raw = response(json!({
            "description": "Coffee",
            "amount": "3.50",
            "date": "2024-01-01",
            "budgetId": c[0].id.to_string(),
        }));

        let err = parse_extraction_response(&raw, &c).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidAmount { index: 0, .. }));
    }

    #[test]
    fn non_positive_amount_rejected() {
        let c = candidates();
        let raw = response(json!({
            "description": "Refund",
            "amount": -5,
            "date": "2024-01-01",
            "budgetId": c[0].id.to_string(),
        }));

        assert!(matches!(
            parse_extraction_response(&raw, &c),
            Err(ExtractionError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn oversized_amounts_rejected() {
        let c = candidates();
        let raw = json!({ "transactions": [
            { "description": "Car", "amount": 9.2e16, "date": "2024-01-01", "budgetId": c[0].id.to_string() },
            { "description": "Boat", "amount": 9.2e16, "date": "2024-01-01", "budgetId": c[0].id.to_string() },
        ]})
        .to_string();

        let err = parse_extraction_response(&raw, &c).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::InvalidAmount { index: 0, reason: "amount is too large" }
        ));

        let raw = response(json!({
            "description": "Car",
            "amount": 1e300,
            "date": "2024-01-01",
            "budgetId": c[0].id.to_string(),
        }));
        let err = parse_extraction_response(&raw, &c).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidAmount { index: 0, .. }));
    }

    #[test]
    fn missing_description_rejected() {
        let c = candidates();
        let raw = response(json!({
            "amount": 1.0,
            "date": "2024-01-01",
            "budgetId": c[0].id.to_string(),
        }));

        assert_eq!(
            parse_extraction_response(&raw, &c).unwrap_err(),
            ExtractionError::MissingField {
                index: 0,
                field: "description"
            }
        );
    }

    #[test]
    fn malformed_dates_rejected() {
        let c = candidates();
        for bad in ["01/01/2024", "2024-1-1", "2024-13-01", "yesterday"] {
            let raw = response(json!({
                "description": "x",
                "amount": 1.0,
                "date": bad,
                "budgetId": c[0].id.to_string(),
            }));
            assert_eq!(
                parse_extraction_response(&raw, &c).unwrap_err(),
                ExtractionError::InvalidDate { index: 0 },
                "date {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn unknown_budget_rejected() {
        let c = candidates();
        let stranger = BudgetId::new().to_string();
        let raw = response(json!({
            "description": "x",
            "amount": 1.0,
            "date": "2024-01-01",
            "budgetId": stranger,
        }));

        assert!(matches!(
            parse_extraction_response(&raw, &c),
            Err(ExtractionError::UnknownBudget { index: 0, .. })
        ));
    }

    #[test]
    fn structural_failures() {
        let c = candidates();
        assert!(matches!(
            parse_extraction_response("not json", &c),
            Err(ExtractionError::Malformed(_))
        ));
        assert!(matches!(
            parse_extraction_response("{\"items\": []}", &c),
            Err(ExtractionError::Malformed(_))
        ));
        assert_eq!(
            parse_extraction_response("{\"transactions\": []}", &c),
            Err(ExtractionError::NoTransactions)
        );
    }

    #[test]
    fn second_bad_transaction_fails_whole_response() {
        let c = candidates();
        let id = c[0].id.to_string();
        let raw = json!({ "transactions": [
            { "description": "ok", "amount": 1.0, "date": "2024-01-01", "budgetId": id },
            { "description": "bad", "amount": "1.0", "date": "2024-01-01", "budgetId": id },
        ]})
        .to_string();

        assert!(matches!(
            parse_extraction_response(&raw, &c),
            Err(ExtractionError::InvalidAmount { index: 1, .. })
        ));
    }
}
