//! Typed identifiers for trades, netting sets, and counterparties.
//!
//! Newtype wrappers keep the three id spaces apart at the type level, so a
//! trade id can never be passed where a netting set id is expected.

use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

define_id! {
    /// Identifier of a single trade.
    ///
    /// # Examples
    ///
    /// ```
    /// use risk_core::types::ids::TradeId;
    ///
    /// let id = TradeId::new("T001");
    /// assert_eq!(id.as_str(), "T001");
    /// ```
    TradeId
}

define_id! {
    /// Identifier of a netting set (a group of trades netted under one CSA).
    NettingSetId
}

define_id! {
    /// Identifier of a counterparty (or of the calculating entity itself,
    /// for own-credit lookups).
    CounterpartyId
}
