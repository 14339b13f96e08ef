//! Fund allocation and distribution engine.
//!
//! Takes a company's payment for a project, splits it across the team,
//! mentor and lab buckets, and tracks the payout of each bucket through its
//! own approval and settlement lifecycle.  Lab fund advances let the lab
//! pre-fund a project and are settled against a payment later.
//!
//! Module map, leaf first:
//!
//! * [`money`], [`split`] – fixed-point amounts and the pure bucket split
//! * [`payments`] – the payment ledger
//! * [`allocations`] – allocation engine and lifecycle
//! * [`payout`] – lifecycle shared by [`distributions`] and [`mentor_payments`]
//! * [`advances`] – lab fund advances
//! * [`api`] – axum REST surface

pub mod advances;
pub mod allocations;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod directory;
pub mod distributions;
pub mod errors;
pub mod mentor_payments;
pub mod money;
pub mod payments;
pub mod payout;
pub mod split;
pub mod summary;


#[cfg(test)]
mod test_allocations;
#[cfg(test)]
mod test_concurrency;
#[cfg(test)]
mod test_mentor_payments;
#[cfg(test)]
mod test_payments;
#[cfg(test)]
mod test_scenario;
