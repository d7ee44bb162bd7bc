//! Plain-text notification messages

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{OrderDetail, TransactionKind};

pub const CURRENCY_SYMBOL: &str = "₦";

const SIGNATURE: &str = "Best regards,\nESOP Committee";

/// Something worth telling a person about
#[derive(Debug, Clone)]
pub enum Notification {
    BalanceChanged {
        username: String,
        amount: i64,
        new_balance: i64,
        kind: TransactionKind,
        note: Option<String>,
        at: DateTime<Utc>,
    },
    OrderConfirmation {
        display_name: String,
        order: OrderDetail,
    },
    OrderFulfillment {
        customer_email: Option<String>,
        order: OrderDetail,
    },
    Test,
}

/// A rendered message ready for delivery
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::BalanceChanged { .. } => "balance_changed",
            Notification::OrderConfirmation { .. } => "order_confirmation",
            Notification::OrderFulfillment { .. } => "order_fulfillment",
            Notification::Test => "test",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Notification::BalanceChanged { amount, .. } if *amount >= 0 => {
                "NESOP Store - Currency Added to Your Account".to_string()
            }
            Notification::BalanceChanged { .. } => {
                "NESOP Store - Currency Deducted from Your Account".to_string()
            }
            Notification::OrderConfirmation { order, .. } => format!(
                "Order Confirmation - NESOP Store Order #{}",
                order.order.order_id
            ),
            Notification::OrderFulfillment { order, .. } => {
                format!("New ESOP Store Order - {}", order.order.order_id)
            }
            Notification::Test => "NESOP Store Email Test".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            Notification::BalanceChanged {
                username,
                amount,
                new_balance,
                kind,
                note,
                at,
            } => {
                let direction = if *amount >= 0 { "added to" } else { "deducted from" };
                let mut body = format!(
                    "Dear {username},\n\n\
                     Your ESOP Store account balance has been updated.\n\n\
                     TRANSACTION DETAILS:\n\
                     Amount {direction} account: {sym} {amount}\n\
                     Transaction type: {kind}\n\
                     Your new balance: {sym} {new_balance}\n\
                     Transaction date: {date}\n",
                    sym = CURRENCY_SYMBOL,
                    amount = amount.abs(),
                    kind = title_case(kind.as_str()),
                    date = at.format("%Y-%m-%d %H:%M:%S"),
                );
                if let Some(note) = note.as_deref().filter(|n| !n.trim().is_empty()) {
                    body.push_str(&format!("\nTransaction note: {}\n", note));
                }
                body.push_str(
                    "\nIf you have any questions about this transaction, please reach out to the ESOP Committee.\n\n",
                );
                body.push_str(SIGNATURE);
                body.push('\n');
                body
            }
            Notification::OrderConfirmation {
                display_name,
                order,
            } => format!(
                "Dear {name},\n\n\
                 Thank you for your order from the ESOP Store!\n\n\
                 ORDER DETAILS:\n\
                 Order ID: {id}\n\
                 Order Date: {date}\n\
                 Order Total: {sym} {total}\n\n\
                 ITEMS ORDERED:\n\
                 {items}\n\
                 Your new account balance: {sym} {balance}\n\n\
                 Someone from the ESOP Committee will contact you shortly to arrange pickup or delivery of your items.\n\n\
                 {signature}\n",
                name = display_name,
                id = order.order.order_id,
                date = order.order.created_at.format("%Y-%m-%d %H:%M:%S"),
                sym = CURRENCY_SYMBOL,
                total = order.order.total_amount,
                items = item_lines(order),
                balance = order.order.balance_after,
                signature = SIGNATURE,
            ),
            Notification::OrderFulfillment {
                customer_email,
                order,
            } => format!(
                "NEW ORDER - ESOP STORE\n\n\
                 A new order has been placed.\n\n\
                 ORDER DETAILS:\n\
                 Order ID: {id}\n\
                 Order Date: {date}\n\
                 Order Total: {sym} {total}\n\n\
                 CUSTOMER INFORMATION:\n\
                 Username: {user}\n\
                 Email: {email}\n\
                 Balance After Order: {sym} {balance}\n\n\
                 ITEMS TO FULFILL:\n\
                 {items}\n\
                 The customer has been notified of their order confirmation.\n",
                id = order.order.order_id,
                date = order.order.created_at.format("%Y-%m-%d %H:%M:%S"),
                sym = CURRENCY_SYMBOL,
                total = order.order.total_amount,
                user = order.order.username,
                email = customer_email.as_deref().unwrap_or("Not available"),
                balance = order.order.balance_after,
                items = item_lines(order),
            ),
            Notification::Test => format!(
                "This is a test message from the NESOP Store.\n\n\
                 If you received it, outbound notifications are configured correctly.\n\n\
                 Sent at: {}\n",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }
}

fn item_lines(order: &OrderDetail) -> String {
    order
        .items
        .iter()
        .map(|line| {
            format!(
                "- {} x{} ({} {} each, {} {})\n",
                line.item_name,
                line.quantity,
                CURRENCY_SYMBOL,
                line.item_price,
                CURRENCY_SYMBOL,
                line.line_total()
            )
        })
        .collect()
}

fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
