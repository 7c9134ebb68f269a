//! Priceable trade boundary.
//!
//! A trade is opaque to the engine: the engine never interprets its
//! economics, only its id, currency, maturity, the index fixings its legs
//! depend on, and the fact that any path-dependent state can be reset
//! between samples.

use risk_core::types::{Currency, Date, TradeId};

use crate::error::EngineError;
use crate::fixings::FixingBuffer;
use crate::market::ScenarioMarket;

/// A floating-index fixing a trade's cash flows depend on.
///
/// Discovered once from the trade's leg structure; the engine uses the set
/// of requirements to synthesise fixings that fall strictly between
/// simulation dates.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixingRequirement {
    /// Name of the floating index (e.g. an IBOR or OIS index).
    pub index: String,
    /// Date on which the index fixes.
    pub fixing_date: Date,
}

/// A trade the valuation engine can price along scenario paths.
///
/// Implementations own any path-dependent state (exercise memory, barrier
/// breaches); [`reset`](Priceable::reset) must return that state to its
/// initial condition so samples are independent trials.
pub trait Priceable: Send {
    /// Returns the stable trade id.
    fn id(&self) -> &TradeId;

    /// Returns the trade's NPV currency.
    fn currency(&self) -> Currency;

    /// Returns the trade's final maturity date.
    fn maturity(&self) -> Date;

    /// Clears path-dependent state at the start of a new sample.
    fn reset(&mut self);

    /// Returns the floating-index fixings this trade's legs require.
    fn fixing_requirements(&self) -> &[FixingRequirement];

    /// Prices the trade against the market's current (sample, date) state.
    ///
    /// `fixings` is the per-sample fixing buffer: any fixing dated between
    /// simulation steps has been synthesised there by the engine, so cash
    /// flows between steps are deterministic and reproducible.
    ///
    /// # Errors
    ///
    /// Pricing failures propagate to the engine, which applies the
    /// configured failure policy; they are never coerced into a value here.
    fn npv(
        &mut self,
        market: &dyn ScenarioMarket,
        fixings: &FixingBuffer,
    ) -> Result<f64, EngineError>;
}
