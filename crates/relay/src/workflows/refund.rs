use chrono::{DateTime, Duration, Utc};
use relay_core::engine::RunError;
use relay_core::protocol::{FieldDefinition, InputSchema, SelectOption};
use relay_core::sdk::RunContext;
use relay_core::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REFUND_WINDOW_DAYS: i64 = 30;
const MAX_REFUND_AGE_DAYS: i64 = 90;
const ESCALATION_THRESHOLD: f64 = 500.0;

pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Process Refund", run).with_description(
        "Look up an order, select items, and process a refund with policy validation and approval gates.",
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OrderItem {
    id: String,
    name: String,
    price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Order {
    id: String,
    customer: String,
    email: String,
    created_at: DateTime<Utc>,
    items: Vec<OrderItem>,
}

impl Order {
    fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }
}

fn simulated_order(order_id: String) -> Order {
    let item = |id: &str, name: &str, price: f64| OrderItem {
        id: id.to_string(),
        name: name.to_string(),
        price,
    };
    Order {
        id: order_id,
        customer: "Jane Smith".to_string(),
        email: "jane@example.com".to_string(),
        created_at: Utc::now() - Duration::days(15),
        items: vec![
            item("item_1", "Wireless Headphones", 149.99),
            item("item_2", "Phone Case", 29.99),
            item("item_3", "USB-C Cable", 19.99),
        ],
    }
}

async fn run(ctx: RunContext) -> Result<(), RunError> {
    let lookup = ctx
        .input(
            "Enter order information",
            Some(InputSchema::new().field("orderId", FieldDefinition::text("Order ID").required())),
            None,
        )
        .await?;
    let order_id = lookup
        .field("orderId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let order = ctx
        .step("lookup-order", || async move { Ok(simulated_order(order_id)) })
        .await?;
    let age_days = order.age_days(Utc::now());

    let items = order
        .items
        .iter()
        .map(|i| format!("{} - ${:.2}", i.name, i.price))
        .collect::<Vec<_>>()
        .join(", ");
    ctx.output(format!(
        "Order {}\nCustomer: {} ({})\nPlaced: {age_days} days ago\nItems: {items}",
        order.id, order.customer, order.email
    ))
    .await?;

    let schema = order.items.iter().fold(InputSchema::new(), |schema, item| {
        schema.field(
            item.id.clone(),
            FieldDefinition::checkbox(format!("{} (${:.2})", item.name, item.price)),
        )
    });
    let selection = ctx.input("Select items to refund", Some(schema), None).await?;
    let selected: Vec<&OrderItem> = order
        .items
        .iter()
        .filter(|item| {
            selection
                .field(&item.id)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
        .collect();

    if selected.is_empty() {
        return ctx.output("No items selected. Refund cancelled.").await;
    }
    let total: f64 = selected.iter().map(|item| item.price).sum();

    let reason = ctx
        .input(
            "Refund reason",
            Some(
                InputSchema::new()
                    .field(
                        "reason",
                        FieldDefinition::select(
                            "Reason",
                            vec![
                                SelectOption::new("defective", "Defective product"),
                                SelectOption::new("wrong_item", "Wrong item received"),
                                SelectOption::new("changed_mind", "Changed mind"),
                                SelectOption::new("duplicate", "Duplicate order"),
                                SelectOption::new("other", "Other"),
                            ],
                        ),
                    )
                    .field(
                        "reasonDetail",
                        FieldDefinition::text("Additional details (optional)"),
                    ),
            ),
            None,
        )
        .await?;
    let reason_code = reason
        .field("reason")
        .and_then(Value::as_str)
        .unwrap_or("other");
    let detail = reason
        .field("reasonDetail")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(|d| format!(" - {d}"))
        .unwrap_or_default();

    let names = selected
        .iter()
        .map(|item| item.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    ctx.output(format!(
        "Refund summary:\nItems: {names}\nTotal: ${total:.2}\nReason: {reason_code}{detail}"
    ))
    .await?;

    if age_days > MAX_REFUND_AGE_DAYS {
        return ctx
            .output("Refund rejected: Order is outside the 90-day refund window.")
            .await;
    }

    if age_days > REFUND_WINDOW_DAYS {
        let approved = ctx
            .confirm(format!(
                "Refund requires manager approval: Order is {age_days} days old (outside 30-day window)."
            ))
            .await?;
        if !approved {
            return ctx.output("Refund rejected by manager.").await;
        }
        ctx.output("Manager approval received.").await?;
    }

    if total > ESCALATION_THRESHOLD {
        let approved = ctx
            .confirm(format!(
                "Refund requires escalation: Amount (${total:.2}) exceeds $500 threshold."
            ))
            .await?;
        if !approved {
            return ctx.output("Refund rejected during escalation.").await;
        }
        ctx.output("Escalation approved.").await?;
    }

    let run_id = ctx.run_id();
    let refund_id = ctx
        .step("issue-refund", || async move {
            Ok(format!("REF-{}", Utc::now().timestamp_millis()))
        })
        .await?;

    ctx.output(format!(
        "Refund processed successfully!\n\nRefund ID: {refund_id}\nAmount: ${total:.2}\nRun: {run_id}\nConfirmation email sent to {}",
        order.email
    ))
    .await
}
