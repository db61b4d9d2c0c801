//! State accessor implementations
//!
//! Provides two [`StateReader`]s:
//! - [`InMemoryState`]: plain maps, for embedders that mirror state themselves
//! - [`DatabaseState`]: bridge to any revm [`DatabaseRef`] (`CacheDB`, `EmptyDB`, ...)

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::future::{ready, Future};

use alloy::primitives::{Address, B256, U256};
use revm::database::DatabaseRef;

use crate::traits::StateReader;

/// State held in memory
///
/// Unset storage reads as zero. Accounts are empty unless registered with
/// [`InMemoryState::with_account`] or given storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryState {
    storage: HashMap<Address, HashMap<B256, B256>>,
    accounts: HashSet<Address>,
}

impl InMemoryState {
    /// Creates an empty state
    pub fn new() -> Self {
        Default::default()
    }

    /// Marks `address` as an existing, non-empty account
    pub fn with_account(mut self, address: Address) -> Self {
        self.accounts.insert(address);
        self
    }

    /// Sets the storage slot `key` of `address`
    pub fn with_storage(mut self, address: Address, key: B256, value: B256) -> Self {
        self.set_storage(address, key, value);
        self
    }

    /// Sets the storage slot `key` of `address` in place
    ///
    /// Seeds the state a later trace starts from.
    pub fn set_storage(&mut self, address: Address, key: B256, value: B256) {
        self.accounts.insert(address);
        self.storage.entry(address).or_default().insert(key, value);
    }
}

impl StateReader for InMemoryState {
    type Error = Infallible;

    fn storage(
        &self,
        address: Address,
        key: B256,
    ) -> impl Future<Output = Result<B256, Self::Error>> + Send {
        let value = self
            .storage
            .get(&address)
            .and_then(|slots| slots.get(&key))
            .copied()
            .unwrap_or_default();
        ready(Ok(value))
    }

    fn is_empty(&self, address: Address) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        ready(Ok(!self.accounts.contains(&address)))
    }
}

/// State read from a revm database
///
/// # Example
/// ```no_run
/// use revm::database::{CacheDB, EmptyDB};
/// use structlog_trace::{utils::state_utils::DatabaseState, StructLogger};
///
/// let db = CacheDB::new(EmptyDB::default());
/// let logger = StructLogger::new(DatabaseState::new(db));
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseState<DB> {
    db: DB,
}

impl<DB> DatabaseState<DB> {
    /// Wraps `db`
    pub fn new(db: DB) -> Self {
        Self { db }
    }

    /// Returns the wrapped database
    pub fn db(&self) -> &DB {
        &self.db
    }

    /// Mutable access to the wrapped database, e.g. to apply writes
    pub fn db_mut(&mut self) -> &mut DB {
        &mut self.db
    }
}

impl<DB> StateReader for DatabaseState<DB>
where
    DB: DatabaseRef,
    DB::Error: Send + Sync + 'static,
{
    type Error = DB::Error;

    fn storage(
        &self,
        address: Address,
        key: B256,
    ) -> impl Future<Output = Result<B256, Self::Error>> + Send {
        let value = self
            .db
            .storage_ref(address, U256::from_be_bytes(key.0))
            .map(B256::from);
        ready(value)
    }

    fn is_empty(&self, address: Address) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let empty = self
            .db
            .basic_ref(address)
            .map(|info| info.map_or(true, |info| info.is_empty()));
        ready(empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use revm::{
        database::{CacheDB, EmptyDB},
        state::AccountInfo,
    };

    const CONTRACT: Address = address!("cafe00000000000000000000000000000000face");

    #[test]
    fn test_in_memory_state() {
        let key = B256::with_last_byte(1);
        let state = InMemoryState::new().with_storage(CONTRACT, key, B256::with_last_byte(7));

        let value = tokio_test::block_on(state.storage(CONTRACT, key)).unwrap();
        assert_eq!(value, B256::with_last_byte(7));
        let unset = tokio_test::block_on(state.storage(CONTRACT, B256::ZERO)).unwrap();
        assert_eq!(unset, B256::ZERO);

        assert!(!tokio_test::block_on(state.is_empty(CONTRACT)).unwrap());
        assert!(tokio_test::block_on(state.is_empty(Address::ZERO)).unwrap());
    }

    #[test]
    fn test_database_state() {
        let mut db = CacheDB::new(EmptyDB::default());
        db.insert_account_info(
            CONTRACT,
            AccountInfo {
                nonce: 1,
                ..Default::default()
            },
        );
        db.insert_account_storage(CONTRACT, U256::from(1), U256::from(42))
            .unwrap();
        let state = DatabaseState::new(db);

        let value = tokio_test::block_on(state.storage(CONTRACT, B256::with_last_byte(1))).unwrap();
        assert_eq!(value, B256::with_last_byte(42));
        assert!(!tokio_test::block_on(state.is_empty(CONTRACT)).unwrap());
        assert!(tokio_test::block_on(state.is_empty(Address::ZERO)).unwrap());
    }
}
