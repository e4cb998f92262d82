//! Structural and business rules an order must satisfy before it is cached or persisted.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::domain::orders::{Delivery, Item, Order, Payment};

pub const MAX_ORDER_UID_LEN: usize = 100;
pub const CURRENCY_CODE_LEN: usize = 3;
const FUTURE_TOLERANCE: Duration = Duration::hours(24);

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone pattern compiles"));
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern compiles")
});

/// Part of the order a violation was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Main,
    Delivery,
    Payment,
    Items,
}

impl Section {
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Main => "order main",
            Section::Delivery => "delivery",
            Section::Payment => "payment",
            Section::Items => "items",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {}: {}", .section.as_str(), .message)]
pub struct ValidationError {
    pub section: Section,
    pub field: &'static str,
    pub item_index: Option<usize>,
    pub message: String,
}

impl ValidationError {
    fn new(section: Section, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            section,
            field,
            item_index: None,
            message: message.into(),
        }
    }

    fn item(index: usize, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            section: Section::Items,
            field,
            item_index: Some(index),
            message: format!("item[{index}]: {}", message.into()),
        }
    }
}

/// Predicate applied to every inbound order.
///
/// Implementations must be free of side effects; the service calls them concurrently
/// without synchronization.
pub trait OrderValidator: Send + Sync {
    fn validate(&self, order: &Order) -> Result<(), ValidationError>;
}

/// Default rule set: main fields, then delivery, payment and each item in turn.
/// The first violation found is returned.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardOrderValidator;

impl OrderValidator for StandardOrderValidator {
    fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        validate_main(order, OffsetDateTime::now_utc())?;
        validate_delivery(&order.delivery)?;
        validate_payment(&order.payment)?;
        validate_items(&order.items)
    }
}

fn validate_main(order: &Order, now: OffsetDateTime) -> Result<(), ValidationError> {
    require(Section::Main, "order_uid", &order.order_uid)?;
    if order.order_uid.chars().count() > MAX_ORDER_UID_LEN {
        return Err(ValidationError::new(
            Section::Main,
            "order_uid",
            "order_uid too long",
        ));
    }
    require(Section::Main, "track_number", &order.track_number)?;
    require(Section::Main, "entry", &order.entry)?;
    require(Section::Main, "locale", &order.locale)?;
    require(Section::Main, "customer_id", &order.customer_id)?;
    require(Section::Main, "delivery_service", &order.delivery_service)?;
    if order.sm_id < 0 {
        return Err(ValidationError::new(
            Section::Main,
            "sm_id",
            "sm_id cannot be negative",
        ));
    }
    if order.date_created > now + FUTURE_TOLERANCE {
        return Err(ValidationError::new(
            Section::Main,
            "date_created",
            "date_created cannot be in the future",
        ));
    }
    Ok(())
}

fn validate_delivery(delivery: &Delivery) -> Result<(), ValidationError> {
    require(Section::Delivery, "name", &delivery.name)?;
    require(Section::Delivery, "phone", &delivery.phone)?;
    if !PHONE_PATTERN.is_match(&delivery.phone) {
        return Err(ValidationError::new(
            Section::Delivery,
            "phone",
            "invalid phone format",
        ));
    }
    require(Section::Delivery, "zip", &delivery.zip)?;
    require(Section::Delivery, "city", &delivery.city)?;
    require(Section::Delivery, "address", &delivery.address)?;
    require(Section::Delivery, "region", &delivery.region)?;
    require(Section::Delivery, "email", &delivery.email)?;
    if !EMAIL_PATTERN.is_match(&delivery.email) {
        return Err(ValidationError::new(
            Section::Delivery,
            "email",
            "invalid email format",
        ));
    }
    Ok(())
}

fn validate_payment(payment: &Payment) -> Result<(), ValidationError> {
    require(Section::Payment, "transaction", &payment.transaction)?;
    require(Section::Payment, "currency", &payment.currency)?;
    if payment.currency.chars().count() != CURRENCY_CODE_LEN {
        return Err(ValidationError::new(
            Section::Payment,
            "currency",
            "currency must be 3 characters",
        ));
    }
    require(Section::Payment, "provider", &payment.provider)?;
    non_negative(Section::Payment, "amount", payment.amount)?;
    if payment.payment_dt <= 0 {
        return Err(ValidationError::new(
            Section::Payment,
            "payment_dt",
            "payment_dt is required",
        ));
    }
    require(Section::Payment, "bank", &payment.bank)?;
    non_negative(Section::Payment, "delivery_cost", payment.delivery_cost)?;
    non_negative(Section::Payment, "goods_total", payment.goods_total)?;
    non_negative(Section::Payment, "custom_fee", payment.custom_fee)
}

fn validate_items(items: &[Item]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new(
            Section::Items,
            "items",
            "at least one item is required",
        ));
    }
    items
        .iter()
        .enumerate()
        .try_for_each(|(index, item)| validate_item(index, item))
}

fn validate_item(index: usize, item: &Item) -> Result<(), ValidationError> {
    if item.chrt_id <= 0 {
        return Err(ValidationError::item(index, "chrt_id", "chrt_id must be positive"));
    }
    if item.track_number.trim().is_empty() {
        return Err(ValidationError::item(index, "track_number", "track_number is required"));
    }
    if item.price < 0 {
        return Err(ValidationError::item(index, "price", "price cannot be negative"));
    }
    if item.rid.trim().is_empty() {
        return Err(ValidationError::item(index, "rid", "rid is required"));
    }
    if item.name.trim().is_empty() {
        return Err(ValidationError::item(index, "name", "name is required"));
    }
    if item.sale < 0 {
        return Err(ValidationError::item(index, "sale", "sale cannot be negative"));
    }
    if item.total_price < 0 {
        return Err(ValidationError::item(index, "total_price", "total_price cannot be negative"));
    }
    if item.nm_id <= 0 {
        return Err(ValidationError::item(index, "nm_id", "nm_id must be positive"));
    }
    if item.brand.trim().is_empty() {
        return Err(ValidationError::item(index, "brand", "brand is required"));
    }
    if item.status < 0 {
        return Err(ValidationError::item(index, "status", "status cannot be negative"));
    }
    Ok(())
}

fn require(section: Section, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(
            section,
            field,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn non_negative(section: Section, field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(
            section,
            field,
            format!("{field} cannot be negative"),
        ));
    }
    Ok(())
}
