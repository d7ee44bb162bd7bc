//! Order placement and history
//!
//! An order is priced from the catalog and applied in a single database
//! transaction: balance debit, inventory decrement, order rows and the
//! purchase entry in the currency log either all land or none do.
//! Notifications go out after commit and never roll an order back.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    NotificationOutcome, Order, OrderDetail, OrderItem, OrderLineRequest, OrderReceipt,
    TransactionKind,
};
use crate::notify::{Notification, NotificationService};
use crate::services::catalog::{assess_lines, merge_lines};
use crate::services::ledger::log_transaction;

const ORDER_COLUMNS: &str =
    "order_id, username, user_email, total_amount, balance_after, status, notified, created_at";

/// `ORD-YYYYMMDD-XXXXXXXX` with a random uppercase hex suffix
pub fn generate_order_id(at: DateTime<Utc>) -> String {
    format!("ORD-{}-{:08X}", at.format("%Y%m%d"), rand::random::<u32>())
}

#[derive(sqlx::FromRow)]
struct Buyer {
    balance: i64,
    is_active: bool,
    display_name: Option<String>,
    email: Option<String>,
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: SqlitePool,
    notifications: NotificationService,
}

impl OrderService {
    pub fn new(db_pool: SqlitePool, notifications: NotificationService) -> Self {
        Self {
            db_pool,
            notifications,
        }
    }

    pub async fn place_order(
        &self,
        username: &str,
        lines: &[OrderLineRequest],
    ) -> StoreResult<OrderReceipt> {
        if lines.is_empty() {
            return Err(StoreError::Invalid("Order has no items".to_string()));
        }
        if let Some(bad) = lines.iter().find(|l| l.quantity < 1) {
            return Err(StoreError::Invalid(format!(
                "Quantity for '{}' must be at least 1",
                bad.item
            )));
        }
        let merged = merge_lines(lines)?;

        let mut tx = db::begin_write(&self.db_pool).await?;

        let buyer = sqlx::query_as::<_, Buyer>(
            "SELECT balance, is_active, display_name, email FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("User '{}'", username)))?;

        if !buyer.is_active {
            return Err(StoreError::AccountDisabled);
        }

        let (ready, shortfalls) = assess_lines(&mut tx, &merged).await?;
        if !shortfalls.is_empty() {
            let detail = shortfalls
                .iter()
                .map(|s| format!("{} ({})", s.item, s.reason))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(StoreError::Invalid(format!(
                "Insufficient inventory for {} item(s): {}",
                shortfalls.len(),
                detail
            )));
        }

        let mut total: i64 = 0;
        for (item, quantity) in &ready {
            total = item
                .price
                .checked_mul(*quantity)
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| StoreError::Invalid("Order total overflow".to_string()))?;
        }

        if buyer.balance < total {
            return Err(StoreError::InsufficientBalance {
                needed: total,
                available: buyer.balance,
            });
        }
        let balance_after = buyer.balance - total;

        let now = Utc::now();
        let order_id = generate_order_id(now);
        let user_email = self
            .notifications
            .address_for(username, buyer.email.as_deref());

        sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE username = ?")
            .bind(balance_after)
            .bind(now)
            .bind(username)
            .execute(&mut *tx)
            .await?;

        for (item, quantity) in &ready {
            // SET expressions see the pre-update quantity
            sqlx::query(
                r#"
                UPDATE items SET
                    quantity = quantity - ?,
                    sold_out = CASE WHEN quantity - ? <= 0 THEN 1 ELSE sold_out END,
                    updated_at = ?
                WHERE name = ?
                "#,
            )
            .bind(quantity)
            .bind(quantity)
            .bind(now)
            .bind(&item.name)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, username, user_email, total_amount, balance_after, status, notified, created_at)
            VALUES (?, ?, ?, ?, ?, 'completed', 0, ?)
            "#,
        )
        .bind(&order_id)
        .bind(username)
        .bind(&user_email)
        .bind(total)
        .bind(balance_after)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut order_items = Vec::with_capacity(ready.len());
        for (item, quantity) in &ready {
            sqlx::query(
                "INSERT INTO order_items (order_id, item_name, item_price, quantity) VALUES (?, ?, ?, ?)",
            )
            .bind(&order_id)
            .bind(&item.name)
            .bind(item.price)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            order_items.push(OrderItem {
                item_name: item.name.clone(),
                item_price: item.price,
                quantity: *quantity,
            });
        }

        log_transaction(
            &mut tx,
            username,
            -total,
            balance_after,
            TransactionKind::Purchase,
            Some(&format!("Order {}", order_id)),
            username,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            username = %username,
            total,
            balance_after,
            lines = order_items.len(),
            "Order placed"
        );

        let mut detail = OrderDetail {
            order: Order {
                order_id,
                username: username.to_string(),
                user_email,
                total_amount: total,
                balance_after,
                status: "completed".to_string(),
                notified: false,
                created_at: now,
            },
            items: order_items,
        };

        let display_name = buyer
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| username.to_string());
        let notifications = self.send_order_notifications(&detail, display_name).await;

        if notifications.confirmation_sent {
            sqlx::query("UPDATE orders SET notified = 1 WHERE order_id = ?")
                .bind(&detail.order.order_id)
                .execute(&self.db_pool)
                .await?;
            detail.order.notified = true;
        }

        Ok(OrderReceipt {
            order: detail,
            notifications,
        })
    }

    async fn send_order_notifications(
        &self,
        order: &OrderDetail,
        display_name: String,
    ) -> NotificationOutcome {
        let mut outcome = NotificationOutcome::default();

        match order.order.user_email.as_deref() {
            Some(to) => {
                let confirmation = Notification::OrderConfirmation {
                    display_name,
                    order: order.clone(),
                };
                match self.notifications.send(to, &confirmation).await {
                    Ok(()) => outcome.confirmation_sent = true,
                    Err(e) => outcome.errors.push(format!("confirmation: {}", e)),
                }
            }
            None => outcome
                .errors
                .push("confirmation: no address for customer".to_string()),
        }

        match self.notifications.fulfillment_address() {
            Some(to) => {
                let fulfillment = Notification::OrderFulfillment {
                    customer_email: order.order.user_email.clone(),
                    order: order.clone(),
                };
                match self.notifications.send(to, &fulfillment).await {
                    Ok(()) => outcome.fulfillment_sent = true,
                    Err(e) => outcome.errors.push(format!("fulfillment: {}", e)),
                }
            }
            None => outcome
                .errors
                .push("fulfillment: no fulfillment address configured".to_string()),
        }

        outcome
    }

    async fn load_items(&self, order_id: &str) -> StoreResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT item_name, item_price, quantity FROM order_items WHERE order_id = ? ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(items)
    }

    async fn with_items(&self, orders: Vec<Order>) -> StoreResult<Vec<OrderDetail>> {
        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(&order.order_id).await?;
            details.push(OrderDetail { order, items });
        }
        Ok(details)
    }

    /// Other users' orders look the same as missing ones
    pub async fn get_order(
        &self,
        order_id: &str,
        requester: &str,
        is_admin: bool,
    ) -> StoreResult<OrderDetail> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE order_id = ?",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.db_pool)
        .await?
        .filter(|o| is_admin || o.username == requester)
        .ok_or_else(|| StoreError::NotFound(format!("Order '{}'", order_id)))?;

        let items = self.load_items(&order.order_id).await?;
        Ok(OrderDetail { order, items })
    }

    pub async fn list_orders_for(&self, username: &str) -> StoreResult<Vec<OrderDetail>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE username = ? ORDER BY created_at DESC, order_id DESC",
            ORDER_COLUMNS
        ))
        .bind(username)
        .fetch_all(&self.db_pool)
        .await?;

        self.with_items(orders).await
    }

    pub async fn list_all_orders(&self) -> StoreResult<Vec<OrderDetail>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders ORDER BY created_at DESC, order_id DESC",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.db_pool)
        .await?;

        self.with_items(orders).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, NotificationConfig};
    use crate::db;
    use crate::models::CreateItemRequest;
    use crate::notify::testing::RecordingNotifier;
    use crate::services::{CatalogService, LedgerService, UserService};
    use std::sync::Arc;

    struct Fixture {
        orders: OrderService,
        catalog: CatalogService,
        users: UserService,
        ledger: LedgerService,
        recorder: Arc<RecordingNotifier>,
    }

    async fn setup() -> Fixture {
        let pool = db::create_pool(&Config::for_tests()).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let recorder = Arc::new(RecordingNotifier::default());
        let notifications = NotificationService::new(
            recorder.clone(),
            NotificationConfig {
                enabled: true,
                fulfillment_address: Some("store@company.com".to_string()),
                ..NotificationConfig::default()
            },
            "company.com",
        );

        let users = UserService::new(pool.clone(), 4, "fallback_admin".to_string());
        users.create_local("alice", "password1", 100, false, "admin").await.unwrap();
        users.create_local("bob", "password1", 100, false, "admin").await.unwrap();

        let catalog = CatalogService::new(pool.clone(), std::env::temp_dir(), 1024);
        for (name, price, quantity) in [("Mug", 20, 3), ("Hoodie", 50, 10)] {
            catalog
                .create_item(CreateItemRequest {
                    name: name.to_string(),
                    description: String::new(),
                    price,
                    quantity,
                    sold_out: false,
                    unlisted: false,
                })
                .await
                .unwrap();
        }

        Fixture {
            orders: OrderService::new(pool.clone(), notifications.clone()),
            catalog,
            users,
            ledger: LedgerService::new(pool, notifications),
            recorder,
        }
    }

    fn line(item: &str, quantity: i64) -> OrderLineRequest {
        OrderLineRequest {
            item: item.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_order_id_format() {
        let at = DateTime::parse_from_rfc3339("2025-07-24T10:05:33Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = generate_order_id(at);
        assert!(id.starts_with("ORD-20250724-"));
        let suffix = &id["ORD-20250724-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_place_order_applies_everything() {
        let f = setup().await;

        let receipt = f
            .orders
            .place_order("alice", &[line("Mug", 1), line("Mug", 2)])
            .await
            .unwrap();

        let order = &receipt.order;
        assert_eq!(order.order.total_amount, 60);
        assert_eq!(order.order.balance_after, 40);
        assert_eq!(order.order.user_email.as_deref(), Some("alice@company.com"));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 3);
        assert!(order.order.notified);
        assert!(receipt.notifications.confirmation_sent);
        assert!(receipt.notifications.fulfillment_sent);

        assert_eq!(f.users.get("alice").await.unwrap().balance, 40);

        let mug = f.catalog.get_item("Mug", true).await.unwrap();
        assert_eq!(mug.quantity, 0);
        assert!(mug.sold_out);

        let log = f.ledger.list_transactions(Some("alice"), Some(1), None).await.unwrap();
        assert_eq!(log[0].transaction_type, TransactionKind::Purchase);
        assert_eq!(log[0].amount, -60);
        assert_eq!(log[0].balance_after, 40);

        let sent = f.recorder.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "alice@company.com");
        assert_eq!(sent[1].to, "store@company.com");
    }

    #[tokio::test]
    async fn test_insufficient_balance_changes_nothing() {
        let f = setup().await;

        let result = f
            .orders
            .place_order("alice", &[line("Hoodie", 2), line("Mug", 1)])
            .await;
        assert!(matches!(
            result,
            Err(StoreError::InsufficientBalance {
                needed: 120,
                available: 100
            })
        ));

        assert_eq!(f.users.get("alice").await.unwrap().balance, 100);
        assert_eq!(f.catalog.get_item("Hoodie", true).await.unwrap().quantity, 10);
        assert!(f.orders.list_orders_for("alice").await.unwrap().is_empty());
        assert_eq!(f.ledger.count_transactions(Some("alice")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inventory_shortfall_rejected() {
        let f = setup().await;

        assert!(matches!(
            f.orders.place_order("alice", &[line("Mug", 4)]).await,
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            f.orders.place_order("alice", &[line("Ghost", 1)]).await,
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            f.orders.place_order("alice", &[line("Mug", 0)]).await,
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            f.orders.place_order("alice", &[]).await,
            Err(StoreError::Invalid(_))
        ));
        assert_eq!(f.catalog.get_item("Mug", true).await.unwrap().quantity, 3);
    }

    #[tokio::test]
    async fn test_order_visibility() {
        let f = setup().await;
        let receipt = f.orders.place_order("alice", &[line("Mug", 1)]).await.unwrap();
        let id = receipt.order.order.order_id.clone();

        assert!(f.orders.get_order(&id, "alice", false).await.is_ok());
        assert!(matches!(
            f.orders.get_order(&id, "bob", false).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(f.orders.get_order(&id, "bob", true).await.is_ok());

        f.orders.place_order("bob", &[line("Hoodie", 1)]).await.unwrap();
        assert_eq!(f.orders.list_orders_for("alice").await.unwrap().len(), 1);
        assert_eq!(f.orders.list_all_orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deactivated_user_cannot_order() {
        let f = setup().await;
        f.users
            .upsert_directory_user(&crate::auth::DirectoryEntry {
                dn: "CN=Carol".to_string(),
                account_name: "carol".to_string(),
                display_name: None,
                email: None,
                domain: None,
                groups: Vec::new(),
            })
            .await
            .unwrap();
        f.users.delete("carol").await.unwrap();

        assert!(matches!(
            f.orders.place_order("carol", &[line("Mug", 1)]).await,
            Err(StoreError::AccountDisabled)
        ));
    }

    #[tokio::test]
    async fn test_overflowing_merged_quantity_rejected() {
        let f = setup().await;
        let err = f
            .orders
            .place_order("alice", &[line("Mug", i64::MAX), line("Mug", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert_eq!(f.users.get("alice").await.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_concurrent_orders_on_file_database() {
        let path = std::env::temp_dir().join(format!("nesop-orders-{}.db", uuid::Uuid::new_v4()));
        let mut config = Config::for_tests();
        config.database_url = format!("sqlite://{}", path.display());
        config.db_max_connections = 5;

        let pool = db::create_pool(&config).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let users = UserService::new(pool.clone(), 4, "fallback_admin".to_string());
        users.create_local("alice", "password1", 1000, false, "admin").await.unwrap();
        let catalog = CatalogService::new(pool.clone(), std::env::temp_dir(), 1024);
        catalog
            .create_item(CreateItemRequest {
                name: "Mug".to_string(),
                description: String::new(),
                price: 20,
                quantity: 40,
                sold_out: false,
                unlisted: false,
            })
            .await
            .unwrap();

        let notifications = NotificationService::new(
            Arc::new(crate::notify::DisabledNotifier),
            NotificationConfig::default(),
            "company.com",
        );
        let orders = OrderService::new(pool.clone(), notifications);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let orders = orders.clone();
            tasks.push(tokio::spawn(async move {
                let mut failures = Vec::new();
                for _ in 0..5 {
                    if let Err(e) = orders.place_order("alice", &[line("Mug", 1)]).await {
                        failures.push(e.to_string());
                    }
                }
                failures
            }));
        }

        let mut failures = Vec::new();
        for task in tasks {
            failures.extend(task.await.unwrap());
        }
        assert!(failures.is_empty(), "failed orders: {:?}", failures);

        assert_eq!(users.get("alice").await.unwrap().balance, 200);
        let mug = catalog.get_item("Mug", true).await.unwrap();
        assert_eq!(mug.quantity, 0);
        assert!(mug.sold_out);
        assert_eq!(orders.list_orders_for("alice").await.unwrap().len(), 40);

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
