pub mod cart_panel;
pub mod cart_service;
pub mod checkout_service;
pub mod confirmation_service;
pub mod payment;
pub mod storefront_api;
