pub mod credentials;
pub mod extract;
pub mod login;

pub use credentials::{Claims, CredentialService, TokenPair};
pub use extract::{AdminClaims, UserClaims};
