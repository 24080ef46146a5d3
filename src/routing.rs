//! Application router configuration.

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState, endpoints,
    expense::{create_expense_endpoint, get_expense_endpoint, list_expenses_endpoint},
    not_found::get_404_not_found,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::EXPENSES, get(list_expenses_endpoint))
        .route(endpoints::EXPENSE, get(get_expense_endpoint))
        .route(endpoints::UPI_PAYMENT, post(create_expense_endpoint))
        .fallback(get_404_not_found)
        .with_state(state)
}
