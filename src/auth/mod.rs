pub mod opaque;
pub mod password;
pub mod registry;
pub mod signed;


pub use opaque::OpaqueTokenRegistry;
pub use password::{MAX_PASSWORD_CHARS, PasswordHash, hash_password, verify_password};
pub use registry::{TokenRecord, TokenRegistry, TokenRegistryFactory};
pub use signed::SignedTokenRegistry;
