use std::{sync::Arc, time::Duration};

use rand::{Rng, seq::SliceRandom};
use time::OffsetDateTime;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::OrderPublisher;
use crate::domain::orders::{Delivery, Item, Order, Payment};

const CITIES: &[&str] = &["Kiryat Mozkin", "Haifa", "Tel Aviv", "Eilat", "Netanya"];
const BRANDS: &[&str] = &["Vivienne Sabo", "Maybelline", "Essence", "Nivea"];
const PRODUCTS: &[&str] = &["Mascaras", "Lipstick", "Shampoo", "Hand cream", "Eyeliner"];
const SIZES: &[&str] = &["0", "S", "M", "L", "XL"];
const CURRENCIES: &[&str] = &["USD", "EUR", "RUB"];

/// Build a random order that passes the standard validator.
pub fn synthetic_order() -> Order {
    let mut rng = rand::thread_rng();
    let order_uid = Uuid::new_v4().simple().to_string();
    let track_number = format!("WB{:012}", rng.gen_range(0..1_000_000_000_000u64));
    let now = OffsetDateTime::now_utc();

    let item_count = rng.gen_range(1..=5);
    let items: Vec<Item> = (0..item_count)
        .map(|_| {
            let price = rng.gen_range(100..5000);
            let sale = rng.gen_range(0..50);
            Item {
                chrt_id: rng.gen_range(1..10_000_000),
                track_number: track_number.clone(),
                price,
                rid: Uuid::new_v4().simple().to_string(),
                name: pick(&mut rng, PRODUCTS),
                sale,
                size: pick(&mut rng, SIZES),
                total_price: price * i64::from(100 - sale) / 100,
                nm_id: rng.gen_range(1..10_000_000),
                brand: pick(&mut rng, BRANDS),
                status: rng.gen_range(100..400),
            }
        })
        .collect();

    let goods_total: i64 = items.iter().map(|item| item.total_price).sum();
    let delivery_cost = rng.gen_range(100..1000);

    Order {
        order_uid: order_uid.clone(),
        track_number,
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: "Test Testov".to_string(),
            phone: format!("+972{:07}", rng.gen_range(0..10_000_000)),
            zip: format!("{:07}", rng.gen_range(0..10_000_000)),
            city: pick(&mut rng, CITIES),
            address: format!("Ploshad Mira {}", rng.gen_range(1..200)),
            region: "Kraiot".to_string(),
            email: format!("customer{}@example.com", rng.gen_range(1..100_000)),
        },
        payment: Payment {
            transaction: order_uid,
            request_id: String::new(),
            currency: pick(&mut rng, CURRENCIES),
            provider: "wbpay".to_string(),
            amount: goods_total + delivery_cost,
            payment_dt: now.unix_timestamp(),
            bank: "alpha".to_string(),
            delivery_cost,
            goods_total,
            custom_fee: 0,
        },
        items,
        locale: "en".to_string(),
        internal_signature: String::new(),
        customer_id: format!("customer-{}", rng.gen_range(1..10_000)),
        delivery_service: "meest".to_string(),
        shardkey: rng.gen_range(0..10).to_string(),
        sm_id: rng.gen_range(1..100),
        date_created: now,
        oof_shard: "1".to_string(),
    }
}

fn pick(rng: &mut impl Rng, values: &[&str]) -> String {
    values.choose(rng).copied().unwrap_or_default().to_string()
}

/// Publishes a synthetic order every `period` until shutdown.
pub struct OrderGenerator {
    publisher: Arc<dyn OrderPublisher>,
    period: Duration,
    shutdown: CancellationToken,
}

impl OrderGenerator {
    pub fn new(
        publisher: Arc<dyn OrderPublisher>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            publisher,
            period,
            shutdown,
        }
    }

    pub async fn run(self) -> u64 {
        info!(
            target = "orderflow::generator",
            period_secs = self.period.as_secs(),
            "order generator started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut published = 0u64;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let order = synthetic_order();
            match self.publisher.publish(&order).await {
                Ok(()) => {
                    published += 1;
                    debug!(
                        target = "orderflow::generator",
                        order_uid = %order.order_uid,
                        "synthetic order published"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "orderflow::generator",
                        error = %err,
                        "publishing synthetic order failed, stopping generator"
                    );
                    break;
                }
            }
        }

        info!(
            target = "orderflow::generator",
            published, "order generator stopped"
        );
        published
    }
}
