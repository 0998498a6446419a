//! `SeaORM` entity definitions.

pub mod payment_components;
pub mod payments;
pub mod payout_links;
pub mod payouts;
pub mod refunds;
pub mod users;
pub mod webhook_events;
