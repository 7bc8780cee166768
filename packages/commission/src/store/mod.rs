//! Commission persistence abstraction
//!
//! The engine reads genealogy, orders and rule sets through
//! [`CommissionStore`] and writes each order's batch through a single
//! [`CommissionStore::commit_batch`] call.
//!
//! | Backend | Crate | Use |
//! |---------|-------|-----|
//! | In-memory | `matrix-commission` | Tests, local runs |
//! | PostgreSQL | `matrix-commission-api` | Production (SeaORM) |

mod memory;
mod types;

pub use memory::InMemoryCommissionStore;
pub use types::*;
