//! Core domain model for the Prox weekly-deals pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw promotional deal record as supplied by a feed, before any identity
/// resolution has happened. `retailer`, `product`, `size` and `category` are
/// free-form natural keys; ids are assigned during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealDraft {
    pub retailer: String,
    pub product: String,
    pub size: String,
    pub category: String,
    pub price: f64,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Subscriber roster entry before reconciliation against the users table.
///
/// Neither `name` nor `email` alone is authoritative; reconciliation may
/// match an existing row on either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSeed {
    pub name: String,
    pub email: String,
    pub preferred_retailers: Vec<String>,
}

/// Flattened deal joined with its retailer and product, as handed to the
/// digest templates. Join gaps have already been defaulted ("Unknown" names,
/// empty size/category) and the price parsed out of its decimal text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub retailer_id: Uuid,
    pub product_id: Uuid,
    pub price: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub retailer_name: String,
    pub product_name: String,
    pub product_size: String,
    pub category: String,
}

/// Persisted subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub preferred_retailers: Vec<String>,
}
