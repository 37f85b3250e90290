//! Checkout orchestration: cart snapshot -> order record -> payment.
//!
//! One attempt runs three strictly sequenced stages. Each stage either yields
//! the payload the next one needs or a [`CheckoutError`]; the first error moves
//! the orchestrator to [`CheckoutState::Failed`] and leaves the cart alone.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        checkout::{CardInput, CheckoutDetails, CheckoutRequest, PaymentMethod},
        orders::{OrderItemRequest, OrderSubmission, OrderType, ShippingAddress, WalletLink},
    },
    models::{CartState, ProductType},
    services::{
        cart_service::CartStore,
        payment::{CardPaymentSdk, ProviderError},
        storefront_api::{ApiError, StorefrontApi},
    },
};

const ORDER_FAILED: &str = "please try again later";
const PAYMENT_FAILED: &str = "please try again or use another payment method";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    FirstName,
    LastName,
    Email,
    Address,
}

impl RequiredField {
    /// Form field the error belongs to.
    pub fn key(&self) -> &'static str {
        match self {
            RequiredField::FirstName => "first_name",
            RequiredField::LastName => "last_name",
            RequiredField::Email => "email",
            RequiredField::Address => "address",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RequiredField::FirstName => "first name",
            RequiredField::LastName => "last name",
            RequiredField::Email => "email",
            RequiredField::Address => "shipping address",
        }
    }
}

fn join_labels(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(RequiredField::label)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CheckoutError {
    #[error("Please fill in: {}", join_labels(.0))]
    MissingFields(Vec<RequiredField>),

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Card details are required")]
    MissingCardDetails,

    #[error("A checkout is already in progress")]
    Busy,

    #[error("This checkout has already completed")]
    AlreadyCompleted,

    #[error("No failed checkout to return from")]
    NothingToRetry,

    #[error("Checkout was closed")]
    Closed,

    #[error("Order creation failed: {0}")]
    OrderCreation(String),

    #[error("Payment failed: {0}")]
    Payment(String),
}

impl CheckoutError {
    fn order_creation(err: &ApiError) -> Self {
        CheckoutError::OrderCreation(err.server_message().unwrap_or(ORDER_FAILED).to_string())
    }

    fn payment_api(err: &ApiError) -> Self {
        CheckoutError::Payment(err.server_message().unwrap_or(PAYMENT_FAILED).to_string())
    }

    fn provider(err: &ProviderError) -> Self {
        match err {
            ProviderError::Declined { message, .. } if !message.is_empty() => {
                CheckoutError::Payment(message.clone())
            }
            _ => CheckoutError::Payment(PAYMENT_FAILED.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    CollectingDetails,
    SubmittingOrder,
    ProcessingPayment {
        order_id: String,
    },
    /// Wallet approval: the host navigates away to `approval_url`.
    Redirecting {
        order_id: String,
        approval_url: String,
    },
    Failed {
        error: String,
    },
    Succeeded {
        order_id: String,
        reference: String,
    },
}

impl CheckoutState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            CheckoutState::SubmittingOrder | CheckoutState::ProcessingPayment { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CheckoutState::Redirecting { .. } | CheckoutState::Succeeded { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckoutOutcome {
    Redirect {
        order_id: String,
        approval_url: String,
    },
    Paid {
        order_id: String,
        reference: String,
    },
}

/// Everything the payment stage needs once the order exists.
#[derive(Debug)]
enum PaymentSession {
    Card { card: CardInput },
    RedirectWallet,
}

impl PaymentSession {
    fn select(method: PaymentMethod, card: Option<CardInput>) -> Result<Self, CheckoutError> {
        match (method, card) {
            (PaymentMethod::Card, Some(card)) => Ok(PaymentSession::Card { card }),
            (PaymentMethod::Card, None) => Err(CheckoutError::MissingCardDetails),
            (PaymentMethod::RedirectWallet, _) => Ok(PaymentSession::RedirectWallet),
        }
    }
}

pub struct CheckoutOrchestrator {
    cart: Arc<CartStore>,
    api: Arc<dyn StorefrontApi>,
    card_sdk: Arc<dyn CardPaymentSdk>,
    state: watch::Sender<CheckoutState>,
    details: Mutex<CheckoutDetails>,
    generation: AtomicU64,
}

impl CheckoutOrchestrator {
    pub fn new(
        cart: Arc<CartStore>,
        api: Arc<dyn StorefrontApi>,
        card_sdk: Arc<dyn CardPaymentSdk>,
    ) -> Self {
        let (state, _) = watch::channel(CheckoutState::default());
        Self {
            cart,
            api,
            card_sdk,
            state,
            details: Mutex::new(CheckoutDetails::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CheckoutState> {
        self.state.subscribe()
    }

    /// Last details entered, kept across failures and retries.
    pub fn details(&self) -> CheckoutDetails {
        self.lock_details().clone()
    }

    pub async fn submit(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        let CheckoutRequest {
            details,
            payment_method,
            card,
        } = request;

        let snapshot = self.cart.snapshot();
        let precheck = validate(&details, payment_method, card.as_ref(), &snapshot)
            .and_then(|()| PaymentSession::select(payment_method, card));
        *self.lock_details() = details.clone();

        let generation = self.begin(precheck.as_ref().err())?;
        let session = precheck?;

        let attempt = Uuid::new_v4();
        let submission = build_submission(&snapshot, &details);
        tracing::info!(
            %attempt,
            order_type = %submission.order_type,
            items = submission.items.len(),
            method = ?payment_method,
            "checkout submitted"
        );

        match self.run(generation, attempt, &submission, session).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(%attempt, error = %err, "checkout failed");
                self.transition(
                    generation,
                    CheckoutState::Failed {
                        error: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Failed -> CollectingDetails, handing back the details entered so far.
    pub fn back_to_details(&self) -> Result<CheckoutDetails, CheckoutError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if matches!(state, CheckoutState::Failed { .. }) {
                *state = CheckoutState::CollectingDetails;
                return true;
            }
            if state.is_in_flight() {
                outcome = Err(CheckoutError::Busy);
            } else if *state != CheckoutState::CollectingDetails {
                outcome = Err(CheckoutError::NothingToRetry);
            }
            false
        });
        outcome.map(|()| self.details())
    }

    /// Closes the checkout panel. Any in-flight attempt is abandoned: its
    /// remaining stages do not run and its transitions are dropped. The cart is
    /// not touched.
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(CheckoutState::CollectingDetails);
        tracing::info!("checkout closed");
    }

    async fn run(
        &self,
        generation: u64,
        attempt: Uuid,
        submission: &OrderSubmission,
        session: PaymentSession,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let order = self
            .api
            .create_order(submission, attempt)
            .await
            .map_err(|err| CheckoutError::order_creation(&err))?;
        let order_id = order.order_id;
        tracing::info!(%attempt, %order_id, "order created");

        self.advance(
            generation,
            CheckoutState::ProcessingPayment {
                order_id: order_id.clone(),
            },
        )?;

        match session {
            PaymentSession::RedirectWallet => {
                let wallet = self
                    .api
                    .create_wallet_order(&order_id)
                    .await
                    .map_err(|err| CheckoutError::payment_api(&err))?;

                let approval_url = extract_approval_url(&wallet.links)
                    .ok_or_else(|| CheckoutError::Payment("approval link missing".to_string()))?
                    .to_string();

                self.advance(
                    generation,
                    CheckoutState::Redirecting {
                        order_id: order_id.clone(),
                        approval_url: approval_url.clone(),
                    },
                )?;
                tracing::info!(%attempt, %order_id, "redirecting to wallet approval");

                Ok(CheckoutOutcome::Redirect {
                    order_id,
                    approval_url,
                })
            }
            PaymentSession::Card { card } => {
                let payment = self
                    .api
                    .create_card_payment(&order_id)
                    .await
                    .map_err(|err| CheckoutError::payment_api(&err))?;
                self.ensure_current(generation)?;

                let intent = self
                    .card_sdk
                    .confirm_card_payment(&payment.client_secret, &card)
                    .await
                    .map_err(|err| CheckoutError::provider(&err))?;

                if !intent.succeeded() {
                    return Err(CheckoutError::Payment(format!(
                        "payment status is {}",
                        intent.status
                    )));
                }

                // the charge went through, so the cart goes even if the panel was closed
                self.cart.clear();
                tracing::info!(%attempt, %order_id, reference = %intent.id, "card payment succeeded");

                self.transition(
                    generation,
                    CheckoutState::Succeeded {
                        order_id: order_id.clone(),
                        reference: intent.id.clone(),
                    },
                );

                Ok(CheckoutOutcome::Paid {
                    order_id,
                    reference: intent.id,
                })
            }
        }
    }

    /// Starts an attempt, or records why it cannot start.
    fn begin(&self, invalid: Option<&CheckoutError>) -> Result<u64, CheckoutError> {
        let mut outcome = Err(CheckoutError::Busy);
        self.state.send_if_modified(|state| {
            if state.is_in_flight() {
                return false;
            }
            if state.is_terminal() {
                outcome = Err(CheckoutError::AlreadyCompleted);
                return false;
            }
            if invalid.is_some() {
                outcome = Ok(self.generation.load(Ordering::SeqCst));
                let changed = *state != CheckoutState::CollectingDetails;
                *state = CheckoutState::CollectingDetails;
                return changed;
            }
            outcome = Ok(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            *state = CheckoutState::SubmittingOrder;
            true
        });
        outcome
    }

    fn ensure_current(&self, generation: u64) -> Result<(), CheckoutError> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(CheckoutError::Closed)
        }
    }

    fn advance(&self, generation: u64, next: CheckoutState) -> Result<(), CheckoutError> {
        if self.transition(generation, next) {
            Ok(())
        } else {
            Err(CheckoutError::Closed)
        }
    }

    /// Applies `next` only if the attempt has not been abandoned.
    fn transition(&self, generation: u64, next: CheckoutState) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = next;
            true
        })
    }

    fn lock_details(&self) -> MutexGuard<'_, CheckoutDetails> {
        self.details.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Client-side precondition checked before any network call.
pub fn validate(
    details: &CheckoutDetails,
    method: PaymentMethod,
    card: Option<&CardInput>,
    cart: &CartState,
) -> Result<(), CheckoutError> {
    let missing: Vec<_> = [
        (RequiredField::FirstName, &details.first_name),
        (RequiredField::LastName, &details.last_name),
        (RequiredField::Email, &details.email),
        (RequiredField::Address, &details.address),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(field, _)| field)
    .collect();

    if !missing.is_empty() {
        return Err(CheckoutError::MissingFields(missing));
    }
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if method == PaymentMethod::Card && card.is_none_or(|card| card.payment_method.trim().is_empty()) {
        return Err(CheckoutError::MissingCardDetails);
    }
    Ok(())
}

pub fn build_submission(cart: &CartState, details: &CheckoutDetails) -> OrderSubmission {
    let items: Vec<_> = cart
        .items
        .iter()
        .map(|line| OrderItemRequest {
            product_id: line.id.clone(),
            product_type: line.product_type,
            name: line.title.clone(),
            quantity: line.quantity,
            unit_price: line.price,
            total_price: line.line_total(),
            specifications: line.specifications.clone(),
        })
        .collect();

    OrderSubmission {
        order_type: classify_order(&items),
        items,
        shipping_address: ShippingAddress {
            full_name: details.full_name(),
            address: details.address.trim().to_string(),
            city: details.city.trim().to_string(),
            state: details.state.trim().to_string(),
            postal_code: details.postal_code.trim().to_string(),
            country: details.country.trim().to_string(),
            phone: details.phone.trim().to_string(),
        },
        email: details.email.trim().to_string(),
    }
}

/// `mixed` when items span more than one product type, otherwise the sole
/// type present. An empty list falls back to the default product type.
pub fn classify_order(items: &[OrderItemRequest]) -> OrderType {
    let mut types = items.iter().map(|item| item.product_type);
    match types.next() {
        None => OrderType::Single(ProductType::default()),
        Some(first) if types.all(|other| other == first) => OrderType::Single(first),
        Some(_) => OrderType::Mixed,
    }
}

/// Approval link of a wallet order: `approve` first, then `payer-action`.
pub fn extract_approval_url(links: &[WalletLink]) -> Option<&str> {
    ["approve", "payer-action"].into_iter().find_map(|rel| {
        links
            .iter()
            .find(|link| link.rel.eq_ignore_ascii_case(rel))
            .map(|link| link.href.as_str())
    })
}
