//! Catalog domain types.

pub mod product;

pub use product::{
    parse_product_id, safe_file_stem, ListQuery, ListSort, NewProduct, Product, ProductFields,
    ProductPatch, RepairReport, ValidationError,
};
