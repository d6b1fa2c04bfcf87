#[cfg(test)]
pub mod memory;
mod repo_types;
mod store;

pub use repo_types::{FederatedId, NewUser, User};
pub use store::{PgUserStore, UserStore};
