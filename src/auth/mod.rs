// Authentication module
// Manages token lifecycle and token persistence

mod grant;
mod manager;
mod store;
mod types;

pub use grant::{select_grant, GrantRequest};
pub use manager::TokenManager;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{GrantType, PersistedToken, TokenResponse, TokenState, DEFAULT_EXPIRES_IN_SECS};
