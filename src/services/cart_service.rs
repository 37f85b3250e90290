use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::{
    runtime::{Handle, RuntimeFlavor},
    sync::watch,
};

use crate::{
    models::{CartLine, CartState, Product},
    storage::CartStorage,
};

pub const DEFAULT_STORAGE_KEY: &str = "cart-storage";

#[derive(Debug, Error, PartialEq)]
pub enum CartError {
    #[error("product {0} has no price")]
    MissingPrice(String),

    #[error("product {0} has a negative price")]
    NegativePrice(String),

    #[error("cart total would exceed the supported range")]
    TotalOverflow,
}

/// The single source of truth for what is in the cart.
///
/// Every mutation recomputes the total, writes the full state to durable
/// storage and publishes it to subscribers before returning. Storage failures
/// are logged and do not roll back the in-memory state. A mutation whose total
/// cannot be represented is rejected and leaves the cart unchanged.
pub struct CartStore {
    storage: Arc<dyn CartStorage>,
    key: String,
    state: Mutex<CartState>,
    updates: watch::Sender<CartState>,
}

impl CartStore {
    pub fn new(storage: Arc<dyn CartStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let state = rehydrate(storage.as_ref(), &key);
        let (updates, _) = watch::channel(state.clone());

        Self {
            storage,
            key,
            state: Mutex::new(state),
            updates,
        }
    }

    pub fn add(&self, product: Product) -> Result<(), CartError> {
        let price = match product.price {
            Some(price) if price < Decimal::ZERO => {
                return Err(CartError::NegativePrice(product.id));
            }
            Some(price) => price,
            None => {
                tracing::warn!(product_id = %product.id, "rejected product without price");
                return Err(CartError::MissingPrice(product.id));
            }
        };

        self.mutate("add", |state| {
            if let Some(line) = state.items.iter_mut().find(|line| line.id == product.id) {
                line.quantity = line.quantity.saturating_add(1);
            } else {
                state.items.push(CartLine {
                    id: product.id,
                    title: product.title,
                    price,
                    image: product.image,
                    category: product.category,
                    product_type: product.product_type,
                    quantity: 1,
                    specifications: product.specifications,
                });
            }
        })
    }

    pub fn remove(&self, product_id: &str) {
        // Dropping lines never grows a total that already fit.
        if let Err(err) = self.mutate("remove", |state| {
            state.items.retain(|line| line.id != product_id);
        }) {
            tracing::error!(error = %err, %product_id, "cart remove rejected");
        }
    }

    /// Sets the quantity of a line. Zero or below removes it; unknown ids are
    /// ignored.
    pub fn update_quantity(&self, product_id: &str, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove(product_id);
            return Ok(());
        }

        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        self.mutate("update_quantity", |state| {
            if let Some(line) = state.items.iter_mut().find(|line| line.id == product_id) {
                line.quantity = quantity;
            }
        })
    }

    pub fn clear(&self) {
        if let Err(err) = self.mutate("clear", |state| state.items.clear()) {
            tracing::error!(error = %err, "cart clear rejected");
        }
    }

    pub fn snapshot(&self) -> CartState {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.updates.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(
        &self,
        action: &'static str,
        apply: impl FnOnce(&mut CartState),
    ) -> Result<(), CartError> {
        let mut state = self.lock();

        let mut next = state.clone();
        apply(&mut next);
        if next.recalculate().is_err() {
            tracing::warn!(action, "cart mutation rejected, total out of range");
            return Err(CartError::TotalOverflow);
        }
        *state = next;

        tracing::debug!(
            action,
            lines = state.items.len(),
            total = %state.total,
            "cart updated"
        );

        self.persist(&state);
        self.updates.send_replace(state.clone());
        Ok(())
    }

    fn persist(&self, state: &CartState) {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "cart serialization failed");
                return;
            }
        };

        let save = || self.storage.save(&self.key, &raw);
        // block_in_place is only available on the multi-thread runtime.
        let result = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(save)
            }
            _ => save(),
        };

        if let Err(err) = result {
            tracing::warn!(error = %err, key = %self.key, "cart persistence failed");
        }
    }
}

fn rehydrate(storage: &dyn CartStorage, key: &str) -> CartState {
    let raw = match storage.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CartState::default(),
        Err(err) => {
            tracing::warn!(error = %err, key, "cart snapshot unreadable, starting empty");
            return CartState::default();
        }
    };

    let stored = match serde_json::from_str::<CartState>(&raw) {
        Ok(stored) => stored,
        Err(err) => {
            tracing::warn!(error = %err, key, "cart snapshot corrupt, starting empty");
            return CartState::default();
        }
    };

    if stored.items.iter().any(|line| line.price < Decimal::ZERO) {
        tracing::warn!(key, "cart snapshot has negative prices, starting empty");
        return CartState::default();
    }

    let mut state = CartState::default();
    for line in stored.items.into_iter().filter(|line| line.quantity >= 1) {
        match state.items.iter_mut().find(|existing| existing.id == line.id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => state.items.push(line),
        }
    }
    if state.recalculate().is_err() {
        tracing::warn!(key, "cart snapshot total out of range, starting empty");
        return CartState::default();
    }

    tracing::info!(lines = state.items.len(), total = %state.total, "cart rehydrated");
    state
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::{
        models::{ProductType, Specifications},
        storage::{FileStorage, MemoryStorage, MockCartStorage, StorageError},
    };

    fn product(id: &str, price: Decimal) -> Product {
        Product {
            id: id.into(),
            title: format!("Print {id}"),
            price: Some(price),
            image: format!("https://cdn.example.com/{id}.jpg"),
            category: "prints".into(),
            product_type: ProductType::GalleryPrint,
            specifications: Specifications::new(),
        }
    }

    fn store() -> (Arc<MemoryStorage>, CartStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = CartStore::new(storage.clone(), DEFAULT_STORAGE_KEY);
        (storage, store)
    }

    fn expected_total(state: &CartState) -> Decimal {
        state
            .items
            .iter()
            .map(|line| line.price * Decimal::from(line.quantity))
            .sum()
    }

    #[test]
    fn adding_same_product_twice_increments_quantity() -> TestResult {
        let (_, store) = store();

        store.add(product("A1", Decimal::new(12000, 2)))?;
        store.add(product("A1", Decimal::new(12000, 2)))?;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].quantity, 2);
        assert_eq!(snapshot.total, Decimal::new(24000, 2));
        Ok(())
    }

    #[test]
    fn lines_keep_insertion_order() -> TestResult {
        let (_, store) = store();

        store.add(product("c", Decimal::ONE))?;
        store.add(product("a", Decimal::ONE))?;
        store.add(product("b", Decimal::ONE))?;
        store.add(product("a", Decimal::ONE))?;

        let ids: Vec<_> = store.snapshot().items.into_iter().map(|l| l.id).collect();
        assert_eq!(ids, ["c", "a", "b"]);
        Ok(())
    }

    #[test]
    fn total_tracks_every_mutation() -> TestResult {
        let (_, store) = store();

        store.add(product("a", Decimal::new(1050, 2)))?;
        assert_eq!(store.snapshot().total, expected_total(&store.snapshot()));

        store.add(product("b", Decimal::new(300, 2)))?;
        store.update_quantity("a", 4)?;
        assert_eq!(store.snapshot().total, Decimal::new(4500, 2));

        store.remove("b");
        assert_eq!(store.snapshot().total, Decimal::new(4200, 2));

        store.update_quantity("missing", 3)?;
        store.remove("missing");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.total, expected_total(&snapshot));
        Ok(())
    }

    #[test]
    fn update_quantity_sets_absolute_value() -> TestResult {
        let (_, store) = store();
        store.add(product("a", Decimal::TWO))?;
        store.add(product("a", Decimal::TWO))?;

        store.update_quantity("a", 5)?;

        assert_eq!(store.snapshot().items[0].quantity, 5);
        assert_eq!(store.snapshot().total, Decimal::TEN);
        Ok(())
    }

    #[test]
    fn non_positive_quantity_removes_line() -> TestResult {
        for quantity in [0, -1, -40] {
            let (_, store) = store();
            store.add(product("B1", Decimal::new(4000, 2)))?;
            store.add(product("keep", Decimal::ONE))?;

            store.update_quantity("B1", quantity)?;

            let snapshot = store.snapshot();
            assert!(snapshot.line("B1").is_none(), "quantity {quantity}");
            assert_eq!(snapshot.total, Decimal::ONE);
        }
        Ok(())
    }

    #[test]
    fn removal_to_zero_empties_cart() -> TestResult {
        let (_, store) = store();
        store.add(product("B1", Decimal::new(4000, 2)))?;

        store.update_quantity("B1", 0)?;

        let snapshot = store.snapshot();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total, Decimal::ZERO);
        Ok(())
    }

    #[test]
    fn clear_resets_total() -> TestResult {
        let (_, store) = store();
        store.add(product("a", Decimal::new(999, 2)))?;
        store.add(product("b", Decimal::new(1, 2)))?;

        store.clear();

        let snapshot = store.snapshot();
        assert!(snapshot.items.is_empty());
        assert_eq!(snapshot.total, Decimal::ZERO);
        Ok(())
    }

    #[test]
    fn state_survives_reload() -> TestResult {
        let (storage, store) = store();
        let mut framed = product("framed", Decimal::new(8550, 2));
        framed.specifications.insert("frame".into(), "oak".into());
        store.add(framed)?;
        store.add(product("mug", Decimal::new(1200, 2)))?;
        store.update_quantity("mug", 3)?;
        let before = store.snapshot();
        drop(store);

        let reloaded = CartStore::new(storage, DEFAULT_STORAGE_KEY);

        assert_eq!(reloaded.snapshot(), before);
        Ok(())
    }

    #[test]
    fn missing_price_is_rejected() {
        let (storage, store) = store();
        let mut unpriced = product("a", Decimal::ONE);
        unpriced.price = None;

        let result = store.add(unpriced);

        assert_eq!(result, Err(CartError::MissingPrice("a".into())));
        assert!(store.snapshot().is_empty());
        assert!(matches!(storage.load(DEFAULT_STORAGE_KEY), Ok(None)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let (_, store) = store();

        let result = store.add(product("a", Decimal::NEGATIVE_ONE));

        assert_eq!(result, Err(CartError::NegativePrice("a".into())));
    }

    #[test]
    fn zero_price_is_accepted() -> TestResult {
        let (_, store) = store();
        store.add(product("gift", Decimal::ZERO))?;
        assert_eq!(store.snapshot().items.len(), 1);
        Ok(())
    }

    #[test]
    fn storage_failure_keeps_in_memory_state() -> TestResult {
        let mut storage = MockCartStorage::new();
        storage.expect_load().returning(|_| Ok(None));
        storage.expect_save().returning(|_, value| {
            Err(StorageError::QuotaExceeded {
                size: value.len(),
                quota: 0,
            })
        });
        let store = CartStore::new(Arc::new(storage), DEFAULT_STORAGE_KEY);

        store.add(product("a", Decimal::new(2500, 2)))?;
        store.add(product("a", Decimal::new(2500, 2)))?;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.items[0].quantity, 2);
        assert_eq!(snapshot.total, Decimal::new(5000, 2));
        Ok(())
    }

    #[test]
    fn unreadable_storage_starts_empty() {
        let mut storage = MockCartStorage::new();
        storage
            .expect_load()
            .returning(|_| Err(StorageError::Poisoned));

        let store = CartStore::new(Arc::new(storage), DEFAULT_STORAGE_KEY);

        assert_eq!(store.snapshot(), CartState::default());
    }

    #[test]
    fn corrupt_snapshot_starts_empty() -> TestResult {
        let storage = Arc::new(MemoryStorage::new());
        storage.save(DEFAULT_STORAGE_KEY, "{not json")?;

        let store = CartStore::new(storage, DEFAULT_STORAGE_KEY);

        assert!(store.snapshot().is_empty());
        Ok(())
    }

    #[test]
    fn rehydration_repairs_invariants() -> TestResult {
        let storage = Arc::new(MemoryStorage::new());
        storage.save(
            DEFAULT_STORAGE_KEY,
            r#"{"items":[
                {"id":"a","title":"A","price":"10","image":"","category":"","product_type":"gallery-print","quantity":1},
                {"id":"z","title":"Z","price":"3","image":"","category":"","product_type":"merchandise","quantity":0},
                {"id":"a","title":"A","price":"10","image":"","category":"","product_type":"gallery-print","quantity":2}
            ],"total":"999"}"#,
        )?;

        let store = CartStore::new(storage, DEFAULT_STORAGE_KEY);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].quantity, 3);
        assert_eq!(snapshot.total, Decimal::from(30));
        Ok(())
    }

    #[test]
    fn subscribers_see_each_mutation() -> TestResult {
        let (_, store) = store();
        let mut updates = store.subscribe();

        store.add(product("a", Decimal::TEN))?;
        assert!(updates.has_changed()?);
        assert_eq!(updates.borrow_and_update().total, Decimal::TEN);

        store.clear();
        assert!(updates.has_changed()?);
        assert!(updates.borrow_and_update().is_empty());
        Ok(())
    }

    #[test]
    fn overflowing_quantity_is_rejected_and_cart_stays_usable() -> TestResult {
        let (storage, store) = store();
        store.add(product("a", Decimal::MAX))?;
        let before = store.snapshot();

        let result = store.update_quantity("a", 2);

        assert_eq!(result, Err(CartError::TotalOverflow));
        assert_eq!(store.snapshot(), before);

        store.remove("zzz");
        store.update_quantity("a", 1)?;
        assert_eq!(store.snapshot().total, Decimal::MAX);

        let reloaded = CartStore::new(storage, DEFAULT_STORAGE_KEY);
        assert_eq!(reloaded.snapshot(), before);
        Ok(())
    }

    #[test]
    fn overflowing_add_leaves_cart_unchanged() -> TestResult {
        let (_, store) = store();
        store.add(product("a", Decimal::MAX))?;
        let mut updates = store.subscribe();

        let result = store.add(product("b", Decimal::ONE));

        assert_eq!(result, Err(CartError::TotalOverflow));
        assert!(store.snapshot().line("b").is_none());
        assert!(!updates.has_changed()?);

        store.remove("a");
        store.add(product("b", Decimal::ONE))?;
        assert_eq!(store.snapshot().total, Decimal::ONE);
        Ok(())
    }

    #[test]
    fn snapshot_with_unrepresentable_total_starts_empty() -> TestResult {
        let storage = Arc::new(MemoryStorage::new());
        let max = Decimal::MAX;
        storage.save(
            DEFAULT_STORAGE_KEY,
            &format!(
                r#"{{"items":[{{"id":"a","title":"A","price":"{max}","image":"","category":"","product_type":"gallery-print","quantity":2}}],"total":"0"}}"#
            ),
        )?;

        let store = CartStore::new(storage, DEFAULT_STORAGE_KEY);

        assert!(store.snapshot().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn persists_from_multi_thread_runtime() -> TestResult {
        let dir = tempfile::tempdir()?;
        let storage = Arc::new(FileStorage::open(dir.path())?);
        let store = CartStore::new(storage.clone(), DEFAULT_STORAGE_KEY);

        store.add(product("a", Decimal::TEN))?;
        let before = store.snapshot();
        drop(store);

        let reloaded = CartStore::new(storage, DEFAULT_STORAGE_KEY);
        assert_eq!(reloaded.snapshot(), before);
        Ok(())
    }
}
