use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single line item that failed stock validation.
///
/// Validation inspects every line item before rejecting, so one failed
/// create/update carries the complete list of issues rather than only the
/// first one encountered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockIssue {
    /// No inventory record exists for the item's product/variant pair.
    MissingInventoryRecord { product_name: String },
    /// The record exists but cannot cover the requested quantity.
    InsufficientStock {
        product_name: String,
        available: i32,
        requested: i32,
    },
    /// The record's total on-hand quantity is zero or below.
    OutOfStock { product_name: String },
}

impl fmt::Display for StockIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockIssue::MissingInventoryRecord { product_name } => {
                write!(f, "no inventory record for {}", product_name)
            }
            StockIssue::InsufficientStock {
                product_name,
                available,
                requested,
            } => write!(
                f,
                "insufficient stock for {}: requested {}, available {}",
                product_name, requested, available
            ),
            StockIssue::OutOfStock { product_name } => {
                write!(f, "{} is out of stock", product_name)
            }
        }
    }
}

/// Errors returned by the order and inventory services.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Stock validation failed: {}", format_stock_issues(.0))]
    StockValidation(Vec<StockIssue>),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Concurrent modification of inventory record {0}")]
    ConcurrentModification(Uuid),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

fn format_stock_issues(issues: &[StockIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ServiceError {
    /// Normalizes database errors coming out of sea-orm calls.
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// The stock issues carried by a `StockValidation` error, if any.
    pub fn stock_issues(&self) -> Option<&[StockIssue]> {
        match self {
            ServiceError::StockValidation(issues) => Some(issues),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_validation_lists_every_issue() {
        let err = ServiceError::StockValidation(vec![
            StockIssue::MissingInventoryRecord {
                product_name: "Widget".into(),
            },
            StockIssue::InsufficientStock {
                product_name: "Gadget".into(),
                available: 2,
                requested: 5,
            },
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("Widget"));
        assert!(rendered.contains("Gadget"));
        assert!(rendered.contains("requested 5, available 2"));
    }

    #[test]
    fn stock_issue_wire_shape_is_tagged() {
        let issue = StockIssue::InsufficientStock {
            product_name: "Widget".into(),
            available: 2,
            requested: 5,
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "insufficient_stock");
        assert_eq!(json["available"], 2);
        assert_eq!(json["requested"], 5);
    }

    #[test]
    fn stock_issues_accessor() {
        let err = ServiceError::StockValidation(vec![StockIssue::OutOfStock {
            product_name: "Widget".into(),
        }]);
        assert_eq!(err.stock_issues().map(<[_]>::len), Some(1));
        assert!(ServiceError::NotFound("x".into()).stock_issues().is_none());
    }
}
