//! Strategy post-filters
//!
//! Each discovery strategy applies one [`TokenFilter`] to tokens that have
//! already been appearance-tracked in the current cycle. A filter sees the
//! fresh API row, the (mutable) appearance record and the snapshot from the
//! previous sighting, and either accepts the token or rejects it with a reason.

use serde::{Deserialize, Serialize};

use crate::discovery::history::AppearanceRecord;
use crate::models::{TokenPayload, TokenSnapshot};

const SECS_PER_DAY: f64 = 86_400.0;

pub struct FilterContext<'a> {
    pub token: &'a TokenPayload,
    pub record: &'a mut AppearanceRecord,
    /// Snapshot stored before this cycle's sighting, if the token was known.
    pub previous: Option<&'a TokenSnapshot>,
    pub now: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    Accept,
    Reject(String),
}

#[cfg(test)]
impl FilterVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

pub trait TokenFilter: Send + Sync {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict;
}

impl TokenFilter for Box<dyn TokenFilter> {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict {
        (**self).evaluate(ctx)
    }
}

/// Rejects 24h volume spikes out of proportion to the token's weekly baseline.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VolumeMomentumFilter {
    pub spike_multiplier: f64,
}

impl Default for VolumeMomentumFilter {
    fn default() -> Self {
        Self { spike_multiplier: 3.0 }
    }
}

impl TokenFilter for VolumeMomentumFilter {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict {
        let volume_24h = ctx.token.volume24h.unwrap_or(0.0);
        let volume_7d = match ctx.token.volume7d {
            Some(v) if v > 0.0 => v,
            // No weekly data: assume a flat week, which never trips the check.
            _ => volume_24h * 7.0,
        };

        let ceiling = self.spike_multiplier * (volume_7d / 4.0);
        if volume_24h > ceiling {
            return FilterVerdict::Reject(format!(
                "24h volume ${:.0} exceeds {:.1}x weekly baseline (ceiling ${:.0})",
                volume_24h, self.spike_multiplier, ceiling
            ));
        }
        FilterVerdict::Accept
    }
}

/// Rejects listings that are too young or have lost liquidity since first detection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecentListingsFilter {
    pub min_days_since_listing: f64,
}

impl Default for RecentListingsFilter {
    fn default() -> Self {
        Self { min_days_since_listing: 2.0 }
    }
}

impl TokenFilter for RecentListingsFilter {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict {
        // Recorded before any rejection so the baseline is the true first sighting.
        let liquidity_drop = ctx.token.liquidity.and_then(|current| {
            let first = *ctx.record.first_liquidity.get_or_insert(current);
            (current < first).then_some((current, first))
        });

        if let Some(created) = ctx.token.created_time_secs() {
            let age_days = (ctx.now - created) as f64 / SECS_PER_DAY;
            if age_days < self.min_days_since_listing {
                return FilterVerdict::Reject(format!(
                    "listed {:.1} days ago, minimum is {:.1}",
                    age_days, self.min_days_since_listing
                ));
            }
        }

        if let Some((current, first)) = liquidity_drop {
            return FilterVerdict::Reject(format!(
                "liquidity fell from ${:.0} to ${:.0} since first detection",
                first, current
            ));
        }
        FilterVerdict::Accept
    }
}

/// Rejects price moves that are too large or not confirmed by volume.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PriceMomentumFilter {
    pub max_price_change_percent: f64,
    /// Volume change must be at least this fraction of the price change.
    pub volume_confirmation_ratio: f64,
}

impl Default for PriceMomentumFilter {
    fn default() -> Self {
        Self {
            max_price_change_percent: 50.0,
            volume_confirmation_ratio: 0.5,
        }
    }
}

impl TokenFilter for PriceMomentumFilter {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict {
        let price_change = ctx.token.price_change24h.unwrap_or(0.0);
        if price_change > self.max_price_change_percent {
            return FilterVerdict::Reject(format!(
                "24h price change {:.1}% above {:.1}% ceiling",
                price_change, self.max_price_change_percent
            ));
        }

        let volume_change = ctx.token.volume_change24h.unwrap_or(0.0);
        let required = price_change * self.volume_confirmation_ratio;
        if volume_change < required {
            return FilterVerdict::Reject(format!(
                "volume change {:.1}% does not confirm price change {:.1}% (needs {:.1}%)",
                volume_change, price_change, required
            ));
        }
        FilterVerdict::Accept
    }
}

/// Requires liquidity depth relative to market cap and a growing holder base.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LiquidityGrowthFilter {
    pub min_liquidity_to_mcap_ratio: f64,
}

impl Default for LiquidityGrowthFilter {
    fn default() -> Self {
        Self { min_liquidity_to_mcap_ratio: 0.05 }
    }
}

impl TokenFilter for LiquidityGrowthFilter {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict {
        let market_cap = ctx.token.market_cap.unwrap_or(0.0);
        if market_cap > 0.0 {
            let ratio = ctx.token.liquidity.unwrap_or(0.0) / market_cap;
            if ratio < self.min_liquidity_to_mcap_ratio {
                return FilterVerdict::Reject(format!(
                    "liquidity/market cap {:.3} below {:.3}",
                    ratio, self.min_liquidity_to_mcap_ratio
                ));
            }
        }

        // Growth is measured only against a previous sighting that had a count.
        if let Some(previous) = ctx.previous.and_then(|p| p.holder_count) {
            match ctx.token.holder {
                Some(current) if current > previous => {}
                Some(current) => {
                    return FilterVerdict::Reject(format!(
                        "holders did not grow ({} -> {})",
                        previous, current
                    ));
                }
                None => {
                    return FilterVerdict::Reject(format!("holder count missing, previously {}", previous));
                }
            }
        }
        FilterVerdict::Accept
    }
}

/// Rejects wash-trading patterns: too many trades for the token's size.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TradingActivityFilter {
    pub max_trades_per_million_mcap: f64,
}

impl Default for TradingActivityFilter {
    fn default() -> Self {
        Self { max_trades_per_million_mcap: 500.0 }
    }
}

impl TokenFilter for TradingActivityFilter {
    fn evaluate(&self, ctx: &mut FilterContext<'_>) -> FilterVerdict {
        let market_cap = ctx.token.market_cap.unwrap_or(0.0);
        if market_cap <= 0.0 {
            return FilterVerdict::Accept;
        }

        let trades = ctx.token.txns24h.unwrap_or(0) as f64;
        let ratio = trades / (market_cap / 1_000_000.0);
        if ratio > self.max_trades_per_million_mcap {
            return FilterVerdict::Reject(format!(
                "{:.0} trades per $1M market cap exceeds {:.0}",
                ratio, self.max_trades_per_million_mcap
            ));
        }
        FilterVerdict::Accept
    }
}

/// Filter selection plus thresholds, as written in a strategies file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSettings {
    VolumeMomentum(VolumeMomentumFilter),
    RecentListings(RecentListingsFilter),
    PriceMomentum(PriceMomentumFilter),
    LiquidityGrowth(LiquidityGrowthFilter),
    HighTradingActivity(TradingActivityFilter),
}

impl FilterSettings {
    pub fn label(&self) -> &'static str {
        match self {
            Self::VolumeMomentum(_) => "volume momentum",
            Self::RecentListings(_) => "recent listings",
            Self::PriceMomentum(_) => "price momentum",
            Self::LiquidityGrowth(_) => "liquidity growth",
            Self::HighTradingActivity(_) => "high trading activity",
        }
    }

    pub fn into_filter(self) -> Box<dyn TokenFilter> {
        match self {
            Self::VolumeMomentum(f) => Box::new(f),
            Self::RecentListings(f) => Box::new(f),
            Self::PriceMomentum(f) => Box::new(f),
            Self::LiquidityGrowth(f) => Box::new(f),
            Self::HighTradingActivity(f) => Box::new(f),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let positive = |value: f64, field: &str| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(format!("{} must be a positive number", field))
            }
        };

        match self {
            Self::VolumeMomentum(f) => positive(f.spike_multiplier, "spike_multiplier"),
            Self::RecentListings(f) => {
                if f.min_days_since_listing.is_finite() && f.min_days_since_listing >= 0.0 {
                    Ok(())
                } else {
                    Err("min_days_since_listing must be zero or positive".to_string())
                }
            }
            Self::PriceMomentum(f) => {
                positive(f.max_price_change_percent, "max_price_change_percent")?;
                positive(f.volume_confirmation_ratio, "volume_confirmation_ratio")
            }
            Self::LiquidityGrowth(f) => positive(f.min_liquidity_to_mcap_ratio, "min_liquidity_to_mcap_ratio"),
            Self::HighTradingActivity(f) => positive(f.max_trades_per_million_mcap, "max_trades_per_million_mcap"),
        }
    }
}
