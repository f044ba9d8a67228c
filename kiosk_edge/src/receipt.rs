//! Lays a receipt payload out as lines of plain ASCII for a 58mm thermal printer.
//!
//! The payload is whatever the ordering system put in the session's receipt template, plus the payment fields the
//! cloud adds on completion. Every field is optional; missing ones are left off the receipt.
use serde_json::Value;

pub const RECEIPT_WIDTH: usize = 28;

const ITEM_NAME_WIDTH: usize = 16;
const ITEM_QTY_WIDTH: usize = 3;
const ITEM_PRICE_WIDTH: usize = 8;

pub fn layout(payload: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    let name = text(payload, "restaurantName").unwrap_or_else(|| "Restaurant".to_string());
    lines.push(center(&name));
    for key in ["restaurantAddress", "restaurantPhone"] {
        if let Some(value) = text(payload, key) {
            lines.push(center(&value));
        }
    }
    blank(&mut lines, 2);

    let order = text(payload, "orderNumber").unwrap_or_else(|| "N/A".to_string());
    lines.push(format!("Order: {}", truncate(&order, 20)));
    if let Some(date) = text(payload, "orderDate") {
        lines.push(format!("Date: {}", truncate(&date, 21)));
    }
    if let Some(customer) = text(payload, "customerName") {
        lines.push(format!("Cust: {}", truncate(&customer, 20)));
    }
    blank(&mut lines, 2);

    lines.push("ITEM             QTY  PRICE".to_string());
    lines.push(String::new());
    let items = payload.get("items").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
    lines.extend(items.iter().map(item_line));
    blank(&mut lines, 2);

    if let Some(subtotal) = amount(payload, "subTotal") {
        lines.push(labelled("Subtotal:", subtotal));
    }
    if let Some(tax) = amount(payload, "tax").filter(|t| *t > 0.0) {
        lines.push(labelled("VAT:", tax));
    }
    lines.push(String::new());
    if let Some(total) = amount(payload, "totalAmount") {
        lines.push(labelled("TOTAL:", total));
    }
    blank(&mut lines, 2);

    if let Some(method) = text(payload, "paymentMethod") {
        lines.push(format!("Pay: {}", truncate(&method, 15)));
        lines.push(String::new());
    }
    if let Some(paid) = amount(payload, "amountPaid").filter(|p| *p > 0.0) {
        lines.push(labelled("Paid:", paid));
        if let Some(change) = amount(payload, "change").filter(|c| *c > 0.0) {
            lines.push(labelled("Change:", change));
        }
    }
    blank(&mut lines, 2);

    lines.push(center("THANK YOU!"));
    lines.push(center("Please come again"));
    lines.push(String::new());
    lines.push(center("Have a great day!"));
    blank(&mut lines, 3);
    lines
}

fn item_line(item: &Value) -> String {
    let name = text(item, "productName").unwrap_or_else(|| "Unknown".to_string());
    let qty = item.get("quantity").and_then(Value::as_i64).unwrap_or(0);
    let price = amount(item, "lineTotal").unwrap_or(0.0);
    format!(
        "{:<name_w$} {:>qty_w$}{:>price_w$.2}",
        truncate(&name, ITEM_NAME_WIDTH),
        qty,
        price,
        name_w = ITEM_NAME_WIDTH,
        qty_w = ITEM_QTY_WIDTH,
        price_w = ITEM_PRICE_WIDTH
    )
}

/// `label` followed by the amount, right-aligned so the line is one column short of the full width.
fn labelled(label: &str, value: f64) -> String {
    let width = (RECEIPT_WIDTH - 1).saturating_sub(label.len());
    format!("{label}{value:>width$.2}")
}

fn blank(lines: &mut Vec<String>, n: usize) {
    lines.extend(std::iter::repeat(String::new()).take(n));
}

/// The field as printable ASCII, or `None` if it is missing or blank. Numbers are accepted as text.
fn text(value: &Value, key: &str) -> Option<String> {
    let raw = match value.get(key)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let safe = ascii_safe(raw.trim());
    (!safe.is_empty()).then_some(safe)
}

/// A money field given either as a JSON number or as decimal text.
fn amount(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn ascii_safe(s: &str) -> String {
    s.chars().map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' }).collect()
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn center(text: &str) -> String {
    let text = truncate(&ascii_safe(text.trim()), RECEIPT_WIDTH);
    let padding = RECEIPT_WIDTH - text.len();
    let left = padding / 2;
    format!("{}{text}{}", " ".repeat(left), " ".repeat(padding - left))
}
