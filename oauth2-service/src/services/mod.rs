//! Grant engine and the stores it runs against.

mod database;
pub mod error;
mod grant;
mod memory;
mod policy;
mod scope;
mod store;

pub use database::{AccountDocument, MongoDb};
pub use error::{DeniedReason, GrantError, StoreError};
pub use grant::{AuthContext, EngineSettings, GrantEngine};
pub use memory::MemoryStore;
pub use policy::AccessPolicy;
pub use scope::{resolve_scope, ScopeResolver};
pub use store::{
    AccountStore, ClientStore, CodeStore, ProjectStore, StoreHealth, Stores, TokenStore,
};
