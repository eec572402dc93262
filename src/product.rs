//! Purchasable items described to the widget and recovered from pingbacks.

use std::fmt::Display;

use bon::bon;
use serde::{Deserialize, Serialize};

use crate::types::Price;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    Fixed,
    Subscription,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Fixed => "fixed",
            ProductType::Subscription => "subscription",
        }
    }
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a subscription billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Day,
    Week,
    Month,
    Year,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
            PeriodType::Year => "year",
        }
    }

    /// Lenient parse of the platform's period codes.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Some(PeriodType::Day),
            "week" => Some(PeriodType::Week),
            "month" => Some(PeriodType::Month),
            "year" => Some(PeriodType::Year),
            _ => None,
        }
    }
}

impl Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable product description.
///
/// A trial product is only retained for recurring subscriptions, and only one
/// level deep: the trial of a trial is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    id: String,
    amount: Price,
    currency_code: Option<String>,
    name: Option<String>,
    product_type: ProductType,
    period_length: u32,
    period_type: Option<PeriodType>,
    recurring: bool,
    trial_product: Option<Box<Product>>,
}

#[bon]
impl Product {
    #[builder]
    pub fn new(
        #[builder(into)] id: String,
        #[builder(default)] amount: Price,
        #[builder(into)] currency_code: Option<String>,
        #[builder(into)] name: Option<String>,
        #[builder(default)] product_type: ProductType,
        #[builder(default)] period_length: u32,
        period_type: Option<PeriodType>,
        #[builder(default)] recurring: bool,
        trial_product: Option<Product>,
    ) -> Self {
        let trial_product = trial_product
            .filter(|_| product_type == ProductType::Subscription && recurring)
            .map(|mut trial| {
                if trial.trial_product.take().is_some() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Dropping nested trial of trial product '{}'; only one level is supported",
                        trial.id
                    );
                }
                Box::new(trial)
            });

        Product {
            id,
            amount,
            currency_code,
            name,
            product_type,
            period_length,
            period_type,
            recurring,
            trial_product,
        }
    }
}

impl Product {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn amount(&self) -> Price {
        self.amount
    }

    pub fn currency_code(&self) -> Option<&str> {
        self.currency_code.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn product_type(&self) -> ProductType {
        self.product_type
    }

    pub fn period_length(&self) -> u32 {
        self.period_length
    }

    pub fn period_type(&self) -> Option<PeriodType> {
        self.period_type
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring
    }

    pub fn is_subscription(&self) -> bool {
        self.product_type == ProductType::Subscription
    }

    pub fn trial_product(&self) -> Option<&Product> {
        self.trial_product.as_deref()
    }
}
