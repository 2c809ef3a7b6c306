//! Domain error types.

use common::{OrderId, OrderStatus, ProductId};
use store::StoreError;
use thiserror::Error;

use crate::policy::Action;

/// Coarse classification of a [`CommerceError`], used by callers to pick a
/// transport-level response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidInput,
    InsufficientStock,
    Empty,
    ExceedsQuantity,
    AlreadyPaid,
    InvalidTransition,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Returns a stable snake_case label, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Empty => "empty",
            ErrorKind::ExceedsQuantity => "exceeds_quantity",
            ErrorKind::AlreadyPaid => "already_paid",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Errors returned by the cart and order services.
#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Cart not found")]
    CartNotFound,

    #[error("Product {0} is not in the cart")]
    ItemNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The caller lacks the role or ownership required for the action.
    #[error("Not allowed to {0}")]
    Forbidden(Action),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cannot remove {requested} of product {product_id}: cart holds {in_cart}")]
    ExceedsQuantity {
        product_id: ProductId,
        requested: u32,
        in_cart: u32,
    },

    #[error("Order {0} is already paid")]
    AlreadyPaid(OrderId),

    #[error("Cannot {action} order {order_id} in status {status}")]
    InvalidTransition {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    /// Lock or serialization failure in the store. Retryable.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[source] StoreError),
}

impl CommerceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommerceError::ProductNotFound(_)
            | CommerceError::CartNotFound
            | CommerceError::ItemNotFound(_)
            | CommerceError::OrderNotFound(_) => ErrorKind::NotFound,
            CommerceError::Forbidden(_) => ErrorKind::Forbidden,
            CommerceError::InvalidInput(_) => ErrorKind::InvalidInput,
            CommerceError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CommerceError::EmptyCart => ErrorKind::Empty,
            CommerceError::ExceedsQuantity { .. } => ErrorKind::ExceedsQuantity,
            CommerceError::AlreadyPaid(_) => ErrorKind::AlreadyPaid,
            CommerceError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            CommerceError::Conflict(_) => ErrorKind::Conflict,
            CommerceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<StoreError> for CommerceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(reason) => CommerceError::Conflict(reason),
            StoreError::OutOfRange { column } => {
                CommerceError::InvalidInput(format!("{column} is too large"))
            }
            other => CommerceError::Internal(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, CommerceError>;
