//! Catalog records and the form-level validation that produces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// A stored catalog record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Product {
    /// Sequential, human-readable product number (starts at 0).
    pub product_id: i64,
    pub name: String,
    pub brand: String,
    /// Maximum retail price.
    pub mrp: f64,
    pub weight: String,
    pub flavor: String,
    /// Tax rate in percent.
    pub gst: f64,
    /// Public path of the processed image, relative to the server root (e.g. `uploads/x.jpg`).
    pub image_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record waiting for its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub mrp: f64,
    pub weight: String,
    pub flavor: String,
    pub gst: f64,
    pub image_path: String,
}

impl NewProduct {
    /// Attaches the reserved identifier and timestamps.
    pub fn into_product(self, product_id: i64, now: DateTime<Utc>) -> Product {
        Product {
            product_id,
            name: self.name,
            brand: self.brand,
            mrp: self.mrp,
            weight: self.weight,
            flavor: self.flavor,
            gst: self.gst,
            image_path: self.image_path,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update: `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub mrp: Option<f64>,
    pub weight: Option<String>,
    pub flavor: Option<String>,
    pub gst: Option<f64>,
    pub image_path: Option<String>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self == &ProductPatch::default()
    }

    /// Merges the patch into `product` and bumps `updated_at`.
    pub fn apply(&self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(brand) = &self.brand {
            product.brand = brand.clone();
        }
        if let Some(mrp) = self.mrp {
            product.mrp = mrp;
        }
        if let Some(weight) = &self.weight {
            product.weight = weight.clone();
        }
        if let Some(flavor) = &self.flavor {
            product.flavor = flavor.clone();
        }
        if let Some(gst) = self.gst {
            product.gst = gst;
        }
        if let Some(image_path) = &self.image_path {
            product.image_path = image_path.clone();
        }
        product.updated_at = now;
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("name and image are required")]
    NameAndImageRequired,

    #[error("name must not be empty")]
    EmptyName,

    #[error("invalid number for field '{field}': '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid product id '{0}'")]
    InvalidId(String),
}

/// Raw text fields of an upload or update form, exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFields {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub mrp: Option<String>,
    pub weight: Option<String>,
    pub flavor: Option<String>,
    pub gst: Option<String>,
}

impl ProductFields {
    /// Stores a named form field. Unknown names are ignored and reported back as `false`.
    pub fn set(&mut self, field: &str, value: String) -> bool {
        let slot = match field {
            "name" => &mut self.name,
            "brand" => &mut self.brand,
            "mrp" => &mut self.mrp,
            "weight" => &mut self.weight,
            "flavor" => &mut self.flavor,
            "gst" => &mut self.gst,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Trimmed, non-empty name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Validates the fields of a creation form. Missing optional fields fall back to
    /// empty strings and zero.
    pub fn into_new_product(self, image_path: String) -> Result<NewProduct, ValidationError> {
        let name = self
            .name()
            .ok_or(ValidationError::NameAndImageRequired)?
            .to_string();
        Ok(NewProduct {
            name,
            brand: trimmed(self.brand),
            mrp: parse_amount("mrp", self.mrp.as_deref())?,
            weight: trimmed(self.weight),
            flavor: trimmed(self.flavor),
            gst: parse_amount("gst", self.gst.as_deref())?,
            image_path,
        })
    }

    /// Validates the fields of an update form. Only submitted fields become part of the patch.
    pub fn into_patch(self) -> Result<ProductPatch, ValidationError> {
        let name = match self.name {
            Some(raw) => {
                let name = raw.trim();
                if name.is_empty() {
                    return Err(ValidationError::EmptyName);
                }
                Some(name.to_string())
            }
            None => None,
        };
        let mrp = match self.mrp.as_deref() {
            Some(raw) => Some(parse_amount("mrp", Some(raw))?),
            None => None,
        };
        let gst = match self.gst.as_deref() {
            Some(raw) => Some(parse_amount("gst", Some(raw))?),
            None => None,
        };
        Ok(ProductPatch {
            name,
            brand: self.brand.map(|s| s.trim().to_string()),
            mrp,
            weight: self.weight.map(|s| s.trim().to_string()),
            flavor: self.flavor.map(|s| s.trim().to_string()),
            gst,
            image_path: None,
        })
    }
}

fn trimmed(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Blank means zero; anything else must be a finite number.
fn parse_amount(field: &'static str, raw: Option<&str>) -> Result<f64, ValidationError> {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ValidationError::InvalidNumber {
            field,
            value: raw.to_string(),
        }),
    }
}

/// Parses a product number taken from a URL path segment.
pub fn parse_product_id(raw: &str) -> Result<i64, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id >= 0)
        .ok_or_else(|| ValidationError::InvalidId(raw.to_string()))
}

/// Lowercase ASCII slug of a product name (accents transliterated), safe to use as a file stem.
pub fn safe_file_stem(name: &str) -> String {
    let slug = slug::slugify(name);
    if slug.is_empty() {
        "product".to_string()
    } else {
        slug
    }
}

/// Sort order for the product list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListSort {
    /// Ascending product number.
    Id,
    /// Newest first.
    #[default]
    Recent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub sort: ListSort,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Outcome of a dense renumbering pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RepairReport {
    /// Number of records renumbered.
    pub total: usize,
    /// Records whose identifier actually changed.
    pub changed: usize,
    /// Counter value after the repair (`total - 1`, or -1 when empty).
    pub counter: i64,
}
