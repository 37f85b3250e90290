use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use gallery_storefront::{
    dto::orders::{
        CardPaymentSession, CreatedOrder, OrderSubmission, WalletCapture, WalletOrder,
    },
    models::{Product, ProductType, Specifications},
    services::{
        cart_service::{CartStore, DEFAULT_STORAGE_KEY},
        confirmation_service::{
            CardReturnQuery, ConfirmationError, ConfirmationPage, WalletReturnQuery,
        },
        storefront_api::{ApiError, MockStorefrontApi, StorefrontApi},
    },
    storage::MemoryStorage,
};
use rust_decimal::Decimal;
use tokio::sync::Notify;
use uuid::Uuid;

fn filled_cart() -> anyhow::Result<Arc<CartStore>> {
    let cart = Arc::new(CartStore::new(
        Arc::new(MemoryStorage::new()),
        DEFAULT_STORAGE_KEY,
    ));
    cart.add(Product {
        id: "portrait".into(),
        title: "Custom portrait".into(),
        price: Some(Decimal::from(300)),
        image: String::new(),
        category: "commissions".into(),
        product_type: ProductType::CustomPortrait,
        specifications: Specifications::new(),
    })?;
    Ok(cart)
}

fn wallet_query(token: &str) -> WalletReturnQuery {
    WalletReturnQuery {
        token: Some(token.into()),
        payer_id: Some("PAYER1".into()),
    }
}

#[tokio::test]
async fn card_confirmation_clears_cart_once() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let page = ConfirmationPage::new(cart.clone(), Arc::new(MockStorefrontApi::new()));
    let query = CardReturnQuery {
        payment_intent: Some("pi_9".into()),
        order_id: Some("ord_9".into()),
        redirect_status: Some("succeeded".into()),
    };

    let receipt = page.confirm_card(&query)?;
    assert!(receipt.cleared);
    assert_eq!(receipt.reference, "pi_9");
    assert_eq!(receipt.order_id.as_deref(), Some("ord_9"));
    assert!(cart.snapshot().is_empty());

    // shopper starts a new cart, then reloads the old receipt
    cart.add(Product {
        id: "mug".into(),
        title: "Mug".into(),
        price: Some(Decimal::from(12)),
        image: String::new(),
        category: String::new(),
        product_type: ProductType::Merchandise,
        specifications: Specifications::new(),
    })?;
    let reloaded = page.confirm_card(&query)?;

    assert!(!reloaded.cleared);
    assert_eq!(cart.snapshot().items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failed_redirect_status_keeps_cart() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let page = ConfirmationPage::new(cart.clone(), Arc::new(MockStorefrontApi::new()));

    let result = page.confirm_card(&CardReturnQuery {
        payment_intent: Some("pi_x".into()),
        order_id: None,
        redirect_status: Some("failed".into()),
    });

    assert_eq!(result, Err(ConfirmationError::NotSucceeded("failed".into())));
    assert_eq!(cart.snapshot().items.len(), 1);

    let missing = page.confirm_card(&CardReturnQuery::default());
    assert_eq!(missing, Err(ConfirmationError::MissingReference));
    Ok(())
}

#[tokio::test]
async fn wallet_return_captures_then_clears_once() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let mut api = MockStorefrontApi::new();
    api.expect_capture_wallet_order()
        .withf(|token| token == "TOKEN-1")
        .times(1)
        .returning(|_| {
            Ok(WalletCapture {
                id: "CAPTURE-1".into(),
                status: "COMPLETED".into(),
                order_id: Some("ord_7".into()),
            })
        });
    let page = ConfirmationPage::new(cart.clone(), Arc::new(api));

    let receipt = page.confirm_wallet(&wallet_query("TOKEN-1")).await?;
    assert!(receipt.cleared);
    assert_eq!(receipt.reference, "CAPTURE-1");
    assert_eq!(receipt.order_id.as_deref(), Some("ord_7"));
    assert!(cart.snapshot().is_empty());

    let again = page.confirm_wallet(&wallet_query("TOKEN-1")).await?;
    assert!(!again.cleared);
    Ok(())
}

#[tokio::test]
async fn wallet_capture_failure_keeps_cart() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let mut api = MockStorefrontApi::new();
    api.expect_capture_wallet_order().times(1).returning(|_| {
        Err(ApiError::Rejected {
            status: 422,
            message: "INSTRUMENT_DECLINED".into(),
        })
    });
    let page = ConfirmationPage::new(cart.clone(), Arc::new(api));

    let result = page.confirm_wallet(&wallet_query("TOKEN-2")).await;

    assert_eq!(
        result,
        Err(ConfirmationError::Capture("INSTRUMENT_DECLINED".into()))
    );
    assert_eq!(cart.snapshot().items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn incomplete_wallet_capture_keeps_cart() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let mut api = MockStorefrontApi::new();
    api.expect_capture_wallet_order().returning(|_| {
        Ok(WalletCapture {
            id: "CAPTURE-3".into(),
            status: "PENDING".into(),
            order_id: None,
        })
    });
    let page = ConfirmationPage::new(cart.clone(), Arc::new(api));

    let result = page.confirm_wallet(&wallet_query("TOKEN-3")).await;

    assert_eq!(result, Err(ConfirmationError::NotSucceeded("PENDING".into())));
    assert_eq!(cart.snapshot().items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn wallet_cancel_leaves_cart_alone() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let before = cart.snapshot();
    let page = ConfirmationPage::new(cart.clone(), Arc::new(MockStorefrontApi::new()));

    page.cancel_wallet(&wallet_query("TOKEN-4"));

    assert_eq!(cart.snapshot(), before);
    Ok(())
}

#[tokio::test]
async fn failed_capture_can_be_retried() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let mut api = MockStorefrontApi::new();
    let mut seq = mockall::Sequence::new();
    api.expect_capture_wallet_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(ApiError::EmptyResponse));
    api.expect_capture_wallet_order()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| {
            Ok(WalletCapture {
                id: "CAPTURE-5".into(),
                status: "COMPLETED".into(),
                order_id: None,
            })
        });
    let page = ConfirmationPage::new(cart.clone(), Arc::new(api));

    let first = page.confirm_wallet(&wallet_query("TOKEN-5")).await;
    assert!(matches!(first, Err(ConfirmationError::Capture(_))), "{first:?}");
    assert_eq!(cart.snapshot().items.len(), 1);

    let retry = page.confirm_wallet(&wallet_query("TOKEN-5")).await?;
    assert!(retry.cleared);
    assert!(cart.snapshot().is_empty());
    Ok(())
}

/// Wallet backend whose capture blocks until released.
struct SlowCapture {
    gate: Arc<Notify>,
    captures: AtomicUsize,
}

#[async_trait]
impl StorefrontApi for SlowCapture {
    async fn create_order(
        &self,
        _submission: &OrderSubmission,
        _idempotency_key: Uuid,
    ) -> Result<CreatedOrder, ApiError> {
        panic!("not used")
    }

    async fn create_wallet_order(&self, _order_id: &str) -> Result<WalletOrder, ApiError> {
        panic!("not used")
    }

    async fn create_card_payment(&self, _order_id: &str) -> Result<CardPaymentSession, ApiError> {
        panic!("not used")
    }

    async fn capture_wallet_order(&self, token: &str) -> Result<WalletCapture, ApiError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(WalletCapture {
            id: format!("CAPTURE-{token}"),
            status: "COMPLETED".into(),
            order_id: None,
        })
    }
}

#[tokio::test]
async fn concurrent_wallet_returns_capture_once() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let gate = Arc::new(Notify::new());
    let api = Arc::new(SlowCapture {
        gate: gate.clone(),
        captures: AtomicUsize::new(0),
    });
    let page = ConfirmationPage::new(cart.clone(), api.clone());
    let query = wallet_query("TOKEN-6");

    let (first, second) = tokio::join!(page.confirm_wallet(&query), async {
        // the first visit is parked inside capture by now
        let second = page.confirm_wallet(&query).await;
        gate.notify_one();
        second
    });

    let first = first?;
    let second = second?;
    assert!(first.cleared);
    assert!(!second.cleared);
    assert_eq!(api.captures.load(Ordering::SeqCst), 1);
    assert!(cart.snapshot().is_empty());
    Ok(())
}

#[tokio::test]
async fn abandoned_capture_frees_the_token() -> anyhow::Result<()> {
    let cart = filled_cart()?;
    let gate = Arc::new(Notify::new());
    let api = Arc::new(SlowCapture {
        gate: gate.clone(),
        captures: AtomicUsize::new(0),
    });
    let page = ConfirmationPage::new(cart.clone(), api.clone());
    let query = wallet_query("TOKEN-7");

    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(10),
        page.confirm_wallet(&query),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(cart.snapshot().items.len(), 1);

    gate.notify_one();
    let receipt = page.confirm_wallet(&query).await?;
    assert!(receipt.cleared);
    assert_eq!(api.captures.load(Ordering::SeqCst), 2);
    Ok(())
}
