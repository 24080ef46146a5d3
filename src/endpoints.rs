//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/expenses/{expense_id}', use [format_endpoint].

/// Lists expenses, optionally filtered by category and transaction date.
pub const EXPENSES: &str = "/expenses";
/// A single expense by its ID.
pub const EXPENSE: &str = "/expenses/{expense_id}";
/// Receives UPI payment notifications.
pub const UPI_PAYMENT: &str = "/upi/payment";

/// Replace the parameter in `endpoint_path` with `value`.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, it is returned unchanged.
pub fn format_endpoint(endpoint_path: &str, value: impl std::fmt::Display) -> String {
    let Some(param_start) = endpoint_path.find('{') else {
        return endpoint_path.to_string();
    };

    let param_end = endpoint_path[param_start..]
        .find('}')
        .map(|end| param_start + end + 1)
        .unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        value,
        &endpoint_path[param_end..]
    )
}
