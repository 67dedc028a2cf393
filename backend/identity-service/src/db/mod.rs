/// Database access layer
pub mod accounts;
pub mod services;

pub use accounts::{AccountRepository, PgAccountRepository};
pub use services::{PgServiceRepository, ServiceRepository};
