pub mod password;
pub mod token;

pub use password::{hash_password, verify_password, Password, PasswordHashString};
pub use token::generate_token;
