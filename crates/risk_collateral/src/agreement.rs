//! Collateral agreement (CSA) terms.
//!
//! A `CollateralAgreement` is the immutable value object describing the
//! bilateral margining terms of one netting set. It is owned by the
//! configuration layer and shared (via `Arc`) into every per-scenario
//! collateral account; nothing mutates it for the life of a simulation run.

use std::fmt;
use std::str::FromStr;

use crate::error::CollateralError;

/// Collateralised exposure calculation method.
///
/// Governs on which side the margin period of risk delays settlement:
///
/// - `Symmetric`: both sides settle after the margin period of risk.
/// - `AsymmetricCva`: collateral we post settles immediately (conservative
///   for CVA: the counterparty is assumed to receive without delay).
/// - `AsymmetricDva`: collateral we receive settles immediately.
/// - `NoLag`: both sides settle immediately, without the margin period of
///   risk delay.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CalculationType {
    /// Both margin flows settle after the margin period of risk.
    Symmetric,
    /// Posted collateral settles immediately; received collateral is lagged.
    AsymmetricCva,
    /// Received collateral settles immediately; posted collateral is lagged.
    AsymmetricDva,
    /// No settlement lag on either side.
    NoLag,
}

impl FromStr for CalculationType {
    type Err = CollateralError;

    fn from_str(s: &str) -> Result<Self, CollateralError> {
        match s {
            "Symmetric" => Ok(CalculationType::Symmetric),
            "AsymmetricCVA" => Ok(CalculationType::AsymmetricCva),
            "AsymmetricDVA" => Ok(CalculationType::AsymmetricDva),
            "NoLag" => Ok(CalculationType::NoLag),
            _ => Err(CollateralError::InvalidAgreement(format!(
                "collateral calculation type '{}' not recognised",
                s
            ))),
        }
    }
}

impl fmt::Display for CalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalculationType::Symmetric => "Symmetric",
            CalculationType::AsymmetricCva => "AsymmetricCVA",
            CalculationType::AsymmetricDva => "AsymmetricDVA",
            CalculationType::NoLag => "NoLag",
        };
        write!(f, "{}", s)
    }
}

/// Static bilateral CSA terms for one netting set.
///
/// All monetary amounts are in the collateral currency. Frequencies and the
/// margin period of risk are in calendar days.
///
/// # Examples
///
/// ```
/// use risk_collateral::agreement::{CalculationType, CollateralAgreement};
///
/// let csa = CollateralAgreement::builder()
///     .threshold_rcv(1_000_000.0)
///     .threshold_pay(1_000_000.0)
///     .mta_rcv(100_000.0)
///     .mta_pay(100_000.0)
///     .margin_call_frequency(1)
///     .margin_post_frequency(1)
///     .margin_period_of_risk(10)
///     .calculation_type(CalculationType::Symmetric)
///     .build()
///     .unwrap();
///
/// assert_eq!(csa.margin_period_of_risk(), 10);
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollateralAgreement {
    independent_amount_held: f64,
    threshold_rcv: f64,
    threshold_pay: f64,
    mta_rcv: f64,
    mta_pay: f64,
    margin_call_frequency: i64,
    margin_post_frequency: i64,
    margin_period_of_risk: i64,
    calculation_type: CalculationType,
}

impl CollateralAgreement {
    /// Starts building an agreement.
    pub fn builder() -> CollateralAgreementBuilder {
        CollateralAgreementBuilder::default()
    }

    /// Independent amount held, regardless of mark-to-market.
    #[inline]
    pub fn independent_amount_held(&self) -> f64 {
        self.independent_amount_held
    }

    /// Threshold above which we may call for collateral.
    #[inline]
    pub fn threshold_rcv(&self) -> f64 {
        self.threshold_rcv
    }

    /// Threshold above which the counterparty may call for collateral.
    #[inline]
    pub fn threshold_pay(&self) -> f64 {
        self.threshold_pay
    }

    /// Minimum transfer amount on collateral we receive.
    #[inline]
    pub fn mta_rcv(&self) -> f64 {
        self.mta_rcv
    }

    /// Minimum transfer amount on collateral we post.
    #[inline]
    pub fn mta_pay(&self) -> f64 {
        self.mta_pay
    }

    /// Days between our margin call opportunities.
    #[inline]
    pub fn margin_call_frequency(&self) -> i64 {
        self.margin_call_frequency
    }

    /// Days between the counterparty's margin post opportunities.
    #[inline]
    pub fn margin_post_frequency(&self) -> i64 {
        self.margin_post_frequency
    }

    /// Settlement lag between a margin call and collateral arrival, in days.
    #[inline]
    pub fn margin_period_of_risk(&self) -> i64 {
        self.margin_period_of_risk
    }

    /// The collateralised calculation method.
    #[inline]
    pub fn calculation_type(&self) -> CalculationType {
        self.calculation_type
    }
}

/// Builder for [`CollateralAgreement`] with term validation.
#[derive(Clone, Debug)]
pub struct CollateralAgreementBuilder {
    independent_amount_held: f64,
    threshold_rcv: f64,
    threshold_pay: f64,
    mta_rcv: f64,
    mta_pay: f64,
    margin_call_frequency: i64,
    margin_post_frequency: i64,
    margin_period_of_risk: i64,
    calculation_type: CalculationType,
}

impl Default for CollateralAgreementBuilder {
    /// Daily two-way zero-threshold margining, symmetric, no lag days set.
    fn default() -> Self {
        Self {
            independent_amount_held: 0.0,
            threshold_rcv: 0.0,
            threshold_pay: 0.0,
            mta_rcv: 0.0,
            mta_pay: 0.0,
            margin_call_frequency: 1,
            margin_post_frequency: 1,
            margin_period_of_risk: 0,
            calculation_type: CalculationType::Symmetric,
        }
    }
}

impl CollateralAgreementBuilder {
    /// Sets the independent amount held.
    pub fn independent_amount_held(mut self, value: f64) -> Self {
        self.independent_amount_held = value;
        self
    }

    /// Sets the receive-side threshold.
    pub fn threshold_rcv(mut self, value: f64) -> Self {
        self.threshold_rcv = value;
        self
    }

    /// Sets the pay-side threshold.
    pub fn threshold_pay(mut self, value: f64) -> Self {
        self.threshold_pay = value;
        self
    }

    /// Sets the receive-side minimum transfer amount.
    pub fn mta_rcv(mut self, value: f64) -> Self {
        self.mta_rcv = value;
        self
    }

    /// Sets the pay-side minimum transfer amount.
    pub fn mta_pay(mut self, value: f64) -> Self {
        self.mta_pay = value;
        self
    }

    /// Sets the margin call frequency in days.
    pub fn margin_call_frequency(mut self, days: i64) -> Self {
        self.margin_call_frequency = days;
        self
    }

    /// Sets the margin post frequency in days.
    pub fn margin_post_frequency(mut self, days: i64) -> Self {
        self.margin_post_frequency = days;
        self
    }

    /// Sets the margin period of risk in days.
    pub fn margin_period_of_risk(mut self, days: i64) -> Self {
        self.margin_period_of_risk = days;
        self
    }

    /// Sets the collateralised calculation method.
    pub fn calculation_type(mut self, value: CalculationType) -> Self {
        self.calculation_type = value;
        self
    }

    /// Validates the terms and builds the agreement.
    ///
    /// # Errors
    ///
    /// Returns `CollateralError::InvalidAgreement` if a threshold or MTA is
    /// negative, a frequency is not strictly positive, or the margin period
    /// of risk is negative.
    pub fn build(self) -> Result<CollateralAgreement, CollateralError> {
        if self.threshold_rcv < 0.0 || self.threshold_pay < 0.0 {
            return Err(CollateralError::InvalidAgreement(
                "thresholds must be non-negative".to_string(),
            ));
        }
        if self.mta_rcv < 0.0 || self.mta_pay < 0.0 {
            return Err(CollateralError::InvalidAgreement(
                "minimum transfer amounts must be non-negative".to_string(),
            ));
        }
        if self.margin_call_frequency < 1 || self.margin_post_frequency < 1 {
            return Err(CollateralError::InvalidAgreement(
                "margin frequencies must be at least one day".to_string(),
            ));
        }
        if self.margin_period_of_risk < 0 {
            return Err(CollateralError::InvalidAgreement(
                "margin period of risk must be non-negative".to_string(),
            ));
        }
        Ok(CollateralAgreement {
            independent_amount_held: self.independent_amount_held,
            threshold_rcv: self.threshold_rcv,
            threshold_pay: self.threshold_pay,
            mta_rcv: self.mta_rcv,
            mta_pay: self.mta_pay,
            margin_call_frequency: self.margin_call_frequency,
            margin_post_frequency: self.margin_post_frequency,
            margin_period_of_risk: self.margin_period_of_risk,
            calculation_type: self.calculation_type,
        })
    }
}
