/// Security module: password hashing, token signing, clocks
pub mod clock;
pub mod password;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenRejection, TokenSigner};
