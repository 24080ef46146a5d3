//! Filtering and listing expenses.

use rusqlite::{Connection, ToSql, params_from_iter};
use time::OffsetDateTime;

use crate::{
    Error,
    expense::{EXPENSE_COLUMNS, Expense, map_expense_row},
    timestamp::{StoredTimestamp, parse_timestamp},
};

/// The config for listing expenses.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// The maximum number of expenses to return when a request does not set a valid limit.
    pub default_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { default_limit: 100 }
    }
}

/// The query string parameters for listing expenses, exactly as sent.
///
/// Values are kept as text so that an unparseable value can be ignored
/// instead of failing the whole request. A parameter may be repeated, so
/// every value is kept in the order it was sent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExpenseQueryParams {
    /// Only include expenses with this category.
    pub category: Vec<String>,
    /// Only include expenses that happened at or after this time.
    pub start_date: Vec<String>,
    /// Only include expenses that happened at or before this time.
    pub end_date: Vec<String>,
    /// The maximum number of expenses to return.
    pub limit: Vec<String>,
}

impl ExpenseQueryParams {
    /// Collect the recognised parameters from decoded query string pairs.
    ///
    /// Names are matched exactly (`category`, `startDate`, `endDate` and
    /// `limit`), anything else is ignored.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut params = Self::default();

        for (name, value) in pairs {
            match name.as_str() {
                "category" => params.category.push(value),
                "startDate" => params.start_date.push(value),
                "endDate" => params.end_date.push(value),
                "limit" => params.limit.push(value),
                _ => {}
            }
        }

        params
    }
}

/// Criteria for selecting expenses.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseFilter {
    /// Exact category to match.
    pub category: Option<String>,
    /// Inclusive lower bound on the transaction date.
    pub start_date: Option<OffsetDateTime>,
    /// Inclusive upper bound on the transaction date.
    pub end_date: Option<OffsetDateTime>,
    /// The maximum number of expenses to return.
    pub limit: u32,
}

impl ExpenseFilter {
    /// A filter that selects the most recent `limit` expenses.
    pub fn all(limit: u32) -> Self {
        Self {
            category: None,
            start_date: None,
            end_date: None,
            limit,
        }
    }

    /// Build a filter from query string parameters.
    ///
    /// Empty categories and dates that cannot be parsed are ignored. A limit
    /// that is not a positive integer is replaced by the default limit. When
    /// a parameter is repeated, the first usable value is taken.
    pub fn from_params(params: ExpenseQueryParams, config: &QueryConfig) -> Self {
        let limit = params
            .limit
            .iter()
            .filter_map(|limit| limit.trim().parse::<u32>().ok())
            .find(|&limit| limit > 0)
            .unwrap_or(config.default_limit);

        Self {
            category: params
                .category
                .into_iter()
                .find(|category| !category.is_empty()),
            start_date: params.start_date.iter().find_map(|date| parse_timestamp(date)),
            end_date: params.end_date.iter().find_map(|date| parse_timestamp(date)),
            limit,
        }
    }

    /// The conditions an expense must meet to be selected by this filter.
    pub fn predicates(&self) -> Vec<ExpensePredicate> {
        let category = self.category.clone().map(ExpensePredicate::CategoryIs);
        let start = self.start_date.map(ExpensePredicate::OnOrAfter);
        let end = self.end_date.map(ExpensePredicate::OnOrBefore);

        [category, start, end].into_iter().flatten().collect()
    }
}

/// A single condition on expenses.
///
/// Each predicate renders to one SQL clause with one positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpensePredicate {
    /// The category equals the given text exactly.
    CategoryIs(String),
    /// The transaction happened at or after the given time.
    OnOrAfter(OffsetDateTime),
    /// The transaction happened at or before the given time.
    OnOrBefore(OffsetDateTime),
}

impl ExpensePredicate {
    fn clause(&self) -> &'static str {
        match self {
            ExpensePredicate::CategoryIs(_) => "category = ?",
            ExpensePredicate::OnOrAfter(_) => "transaction_date >= ?",
            ExpensePredicate::OnOrBefore(_) => "transaction_date <= ?",
        }
    }

    fn parameter(&self) -> Box<dyn ToSql + '_> {
        match self {
            ExpensePredicate::CategoryIs(category) => Box::new(category.as_str()),
            ExpensePredicate::OnOrAfter(timestamp) | ExpensePredicate::OnOrBefore(timestamp) => {
                Box::new(StoredTimestamp(*timestamp))
            }
        }
    }
}

/// Get the expenses selected by `filter`, most recent transaction first.
///
/// Expenses with the same transaction date are ordered by when they were
/// recorded, newest first.
///
/// # Errors
/// Returns [Error::SqlError] if the query fails.
pub fn list_expenses(filter: &ExpenseFilter, connection: &Connection) -> Result<Vec<Expense>, Error> {
    let predicates = filter.predicates();

    let where_clause = if predicates.is_empty() {
        String::new()
    } else {
        let clauses: Vec<&str> = predicates.iter().map(ExpensePredicate::clause).collect();
        format!("WHERE {}", clauses.join(" AND "))
    };

    let query = format!(
        "SELECT {EXPENSE_COLUMNS} FROM expense {where_clause} \
        ORDER BY transaction_date DESC, created_at DESC, id ASC \
        LIMIT ?"
    );

    let mut parameters: Vec<Box<dyn ToSql + '_>> =
        predicates.iter().map(ExpensePredicate::parameter).collect();
    parameters.push(Box::new(filter.limit));

    connection
        .prepare(&query)?
        .query_map(params_from_iter(parameters.iter()), map_expense_row)?
        .map(|expense| expense.map_err(Error::SqlError))
        .collect()
}
