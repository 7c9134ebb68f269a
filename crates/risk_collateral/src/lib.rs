//! # risk_collateral (L3: Margining)
//!
//! Bilateral CSA margining along scenario paths: agreement terms, the
//! collateral account state machine, and the helpers that replay margin
//! calls (thresholds, minimum transfer amounts, margin period of risk,
//! independent amounts) for every Monte Carlo scenario of a netting set.
//!
//! ## Pipeline position
//!
//! ```text
//! risk_engine fills the trade exposure cube
//!          ↓
//! risk_collateral::exposure::collateral_balance_paths
//!     one CollateralAccount per scenario, stepped through the
//!     call/post margin schedules of the CollateralAgreement
//!          ↓
//! risk_xva consumes the collateral-adjusted exposure
//! ```
//!
//! ## Scenario independence
//!
//! Each scenario path owns its `CollateralAccount` clone; path generation
//! is parallel across scenarios and strictly sequential within one (the
//! margin-call time stepping has an explicit temporal dependency).

#![warn(missing_docs)]

pub mod account;
pub mod agreement;
pub mod error;
pub mod exposure;

pub use account::CollateralAccount;
pub use agreement::{CalculationType, CollateralAgreement, CollateralAgreementBuilder};
pub use error::CollateralError;
pub use exposure::{
    collateral_balance_paths, credit_support_amount, estimate_exposure_at, margin_requirement,
    update_margin_call, CollateralPathInputs,
};
