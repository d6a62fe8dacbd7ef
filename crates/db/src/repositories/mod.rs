//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod order_page_repo;
pub mod order_photo_repo;
pub mod order_repo;

pub use order_page_repo::OrderPageRepo;
pub use order_photo_repo::OrderPhotoRepo;
pub use order_repo::OrderRepo;
