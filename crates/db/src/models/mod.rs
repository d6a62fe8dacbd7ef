//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and a `Deserialize` DTO for inserts.

pub mod order;
pub mod order_page;
pub mod order_photo;
