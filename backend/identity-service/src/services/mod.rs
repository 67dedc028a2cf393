/// Business logic layer
pub mod accounts;
pub mod issuer;
pub mod local_auth;

pub use accounts::AccountService;
pub use issuer::{ServiceIdentity, TokenIssuer};
pub use local_auth::{AccountDirectory, LocalIssuerClient};
