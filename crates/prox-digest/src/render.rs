//! Weekly digest rendering (HTML + plain text) via askama templates.

use askama::Template;
use chrono::{Datelike, Utc};
use prox_core::Deal;

/// One deal as it appears in a digest, with display strings precomputed so
/// the templates stay dumb.
#[derive(Debug, Clone)]
pub struct DealCard {
    pub product_name: String,
    pub product_size: String,
    pub category: String,
    pub price: String,
    pub start_date: String,
    pub end_date: String,
}

/// Deals for a single retailer, in the order the deals arrived.
#[derive(Debug, Clone)]
pub struct RetailerSection {
    pub retailer: String,
    pub underline: String,
    pub deals: Vec<DealCard>,
}

#[derive(Template)]
#[template(path = "weekly_deals.html")]
struct WeeklyHtmlTemplate<'a> {
    user_name: &'a str,
    sections: Vec<RetailerSection>,
    year: i32,
}

#[derive(Template)]
#[template(path = "weekly_deals.txt", escape = "none")]
struct WeeklyTextTemplate<'a> {
    user_name: &'a str,
    sections: Vec<RetailerSection>,
    year: i32,
}

/// Groups deals by retailer, preserving first-seen retailer order and the
/// deal order within each retailer.
pub fn group_by_retailer(deals: &[Deal]) -> Vec<RetailerSection> {
    let mut sections: Vec<RetailerSection> = Vec::new();
    for deal in deals {
        let card = DealCard {
            product_name: deal.product_name.clone(),
            product_size: deal.product_size.clone(),
            category: deal.category.clone(),
            price: format!("{:.2}", deal.price),
            start_date: deal.start_date.format("%Y-%m-%d").to_string(),
            end_date: deal.end_date.format("%Y-%m-%d").to_string(),
        };
        match sections
            .iter_mut()
            .find(|s| s.retailer == deal.retailer_name)
        {
            Some(section) => section.deals.push(card),
            None => sections.push(RetailerSection {
                retailer: deal.retailer_name.clone(),
                underline: "=".repeat(deal.retailer_name.len()),
                deals: vec![card],
            }),
        }
    }
    sections
}

pub fn subject(deal_count: usize) -> String {
    format!("Your Weekly Deals - {deal_count} Great Offers!")
}

pub fn render_weekly_html(user_name: &str, deals: &[Deal]) -> Result<String, askama::Error> {
    WeeklyHtmlTemplate {
        user_name,
        sections: group_by_retailer(deals),
        year: Utc::now().year(),
    }
    .render()
}

pub fn render_weekly_text(user_name: &str, deals: &[Deal]) -> Result<String, askama::Error> {
    WeeklyTextTemplate {
        user_name,
        sections: group_by_retailer(deals),
        year: Utc::now().year(),
    }
    .render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn deal(retailer: &str, product: &str, price: f64) -> Deal {
        Deal {
            id: Uuid::new_v4(),
            retailer_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            price,
            start_date: NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 7).expect("date"),
            retailer_name: retailer.to_string(),
            product_name: product.to_string(),
            product_size: "1L".to_string(),
            category: "dairy".to_string(),
        }
    }

    #[test]
    fn grouping_preserves_first_seen_retailer_order() {
        let deals = vec![
            deal("Acme", "Milk", 3.5),
            deal("Save-Mart", "Bread", 2.0),
            deal("Acme", "Eggs", 4.0),
        ];
        let sections = group_by_retailer(&deals);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].retailer, "Acme");
        assert_eq!(sections[0].deals.len(), 2);
        assert_eq!(sections[1].retailer, "Save-Mart");
        assert_eq!(sections[0].underline, "====");
    }

    #[test]
    fn html_digest_carries_deals_and_greeting() {
        let html =
            render_weekly_html("Alice", &[deal("Acme", "Milk", 3.5)]).expect("render html");

        assert!(html.contains("Hi Alice,"));
        assert!(html.contains("Acme"));
        assert!(html.contains("Milk"));
        assert!(html.contains("$3.50"));
        assert!(html.contains("Size: 1L | Category: dairy"));
        assert!(html.contains("Manage Preferences"));
    }

    #[test]
    fn prices_format_to_two_decimals() {
        let html = render_weekly_html("Alice", &[deal("Acme", "Milk", 2.0)]).expect("render");
        assert!(html.contains("$2.00"));
    }

    #[test]
    fn text_digest_underlines_retailer_headings() {
        let text =
            render_weekly_text("Alice", &[deal("Save-Mart", "Bread", 2.0)]).expect("render text");

        assert!(text.contains("Hi Alice,"));
        assert!(text.contains("Save-Mart\n========="));
        assert!(text.contains("Price: $2.00"));
        assert!(text.contains("Valid: 2025-09-01 - 2025-09-07"));
        assert!(text.contains("Manage Preferences: https://prox.com/preferences"));
    }

    #[test]
    fn subject_counts_offers() {
        assert_eq!(subject(3), "Your Weekly Deals - 3 Great Offers!");
    }
}
