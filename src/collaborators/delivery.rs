

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{info, warn};
use uuid::Uuid;

use super::{CollaboratorError, OrderRequest, OrderResponse, OrderingService};
use crate::session::missing_ingredients;
use crate::utils::normalize_name;

lazy_static! {
    static ref PRICES: HashMap<&'static str, f64> = HashMap::from([
        ("spaghetti", 2.99),
        ("eggs", 3.49),
        ("pecorino cheese", 6.99),
        ("guanciale", 8.99),
        ("black pepper", 3.99),
        ("salt", 1.99),
        ("chicken breast", 7.99),
        ("onion", 0.99),
        ("garlic", 1.49),
        ("ginger", 2.49),
        ("curry powder", 4.99),
        ("coconut milk", 2.99),
        ("tomatoes", 2.49),
        ("rice", 3.99),
    ]);
}

const PROCESSING_WINDOW_SECS: i64 = 60;
const OUT_FOR_DELIVERY_WINDOW_SECS: i64 = 120;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Processing,
    OutForDelivery,
    Delivered,
}

impl OrderStatus {
    fn after(elapsed: Duration) -> Self {
        if elapsed < Duration::seconds(PROCESSING_WINDOW_SECS) {
            OrderStatus::Processing
        } else if elapsed < Duration::seconds(OUT_FOR_DELIVERY_WINDOW_SECS) {
            OrderStatus::OutForDelivery
        } else {
            OrderStatus::Delivered
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: String,
    pub status: OrderStatus,
    pub items: Vec<String>,
    pub total: f64,
}

#[derive(Debug, Clone)]
struct StoredOrder {
    items: Vec<String>,
    total: f64,
    placed_at: DateTime<Utc>,
}


/// In-process grocery delivery: a fixed price list and an order ledger.
#[derive(Debug, Default)]
pub struct MockDelivery {
    orders: Mutex<HashMap<String, StoredOrder>>,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unit price, or zero for items the shop does not list.
    pub fn price_of(item: &str) -> f64 {
        PRICES.get(normalize_name(item).as_str()).copied().unwrap_or(0.0)
    }

    /// Required items not covered by `available`, sorted.
    pub fn compare_ingredients(&self, required: &[String], available: &[String]) -> Vec<String> {
        missing_ingredients(required, available).into_iter().collect()
    }

    pub fn order(&self, items: &BTreeSet<String>) -> Result<OrderResponse, CollaboratorError> {
        if items.is_empty() {
            return Err(CollaboratorError::Rejected("order has no items".to_string()));
        }

        let items: Vec<String> = items.iter().map(|item| normalize_name(item)).collect();
        let cents: f64 = items.iter().map(|item| Self::price_of(item)).sum::<f64>() * 100.0;
        let total = cents.round() / 100.0;
        let order_id = Uuid::new_v4().to_string();

        self.orders.lock().insert(
            order_id.clone(),
            StoredOrder {
                items: items.clone(),
                total,
                placed_at: Utc::now(),
            },
        );

        info!("Order {} placed: {} items, total ${:.2}", order_id, items.len(), total);
        Ok(OrderResponse { order_id, total })
    }

    pub fn order_status(&self, order_id: &str) -> Result<OrderStatusReport, CollaboratorError> {
        self.order_status_at(order_id, Utc::now())
    }

    pub fn order_status_at(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<OrderStatusReport, CollaboratorError> {
        let orders = self.orders.lock();
        let Some(order) = orders.get(order_id) else {
            warn!("Status requested for unknown order {}", order_id);
            return Err(CollaboratorError::Rejected(format!("order {order_id} not found")));
        };

        Ok(OrderStatusReport {
            order_id: order_id.to_string(),
            status: OrderStatus::after(now - order.placed_at),
            items: order.items.clone(),
            total: order.total,
        })
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().len()
    }
}

#[async_trait]
impl OrderingService for MockDelivery {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResponse, CollaboratorError> {
        self.order(&request.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_order_totals_listed_prices() {
        let delivery = MockDelivery::new();
        let response = delivery.order(&items(&["Curry Powder", "rice"])).unwrap();
        assert_eq!(response.total, 8.98);
        assert!(Uuid::parse_str(&response.order_id).is_ok());
        assert_eq!(delivery.order_count(), 1);
    }

    #[test]
    fn test_unlisted_items_are_free() {
        let response = MockDelivery::new().order(&items(&["saffron"])).unwrap();
        assert_eq!(response.total, 0.0);
    }

    #[test]
    fn test_empty_order_is_rejected() {
        let result = MockDelivery::new().order(&BTreeSet::new());
        assert!(matches!(result, Err(CollaboratorError::Rejected(_))));
    }

    #[test]
    fn test_status_progresses_with_time() {
        let delivery = MockDelivery::new();
        let id = delivery.order(&items(&["eggs"])).unwrap().order_id;
        let now = Utc::now();

        let status = |offset: i64| {
            delivery
                .order_status_at(&id, now + Duration::seconds(offset))
                .unwrap()
                .status
        };
        assert_eq!(status(0), OrderStatus::Processing);
        assert_eq!(status(90), OrderStatus::OutForDelivery);
        assert_eq!(status(600), OrderStatus::Delivered);
    }

    #[test]
    fn test_unknown_order_status_is_rejected() {
        let result = MockDelivery::new().order_status("nope");
        assert!(matches!(result, Err(CollaboratorError::Rejected(_))));
    }

    #[test]
    fn test_compare_ingredients_matches_compute_missing() {
        let required = vec!["Chicken".to_string(), "onion".to_string(), "curry powder".to_string()];
        let available = vec!["chicken".to_string(), "ONION".to_string()];
        assert_eq!(
            MockDelivery::new().compare_ingredients(&required, &available),
            vec!["curry powder"]
        );
    }

    #[test]
    fn test_status_names() {
        assert_eq!(OrderStatus::OutForDelivery.to_string(), "out_for_delivery");
    }
}
