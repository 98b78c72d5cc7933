use serde::{Deserialize, Serialize};

use crate::api::{SortType, TokenListQuery};
use crate::discovery::filters::{
    FilterSettings, LiquidityGrowthFilter, PriceMomentumFilter, RecentListingsFilter,
    TradingActivityFilter, VolumeMomentumFilter,
};
use crate::discovery::persistence::history_file_name;
use crate::error::GemHunterError;

/// A named discovery configuration: what to ask the API for, how to filter
/// the answer and how many consecutive sightings make a token promising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub query: TokenListQuery,
    pub min_consecutive_appearances: u32,
    pub filter: FilterSettings,
}

impl StrategyConfig {
    pub fn volume_momentum() -> Self {
        let mut query = TokenListQuery::new("volume_24h_change_percent", SortType::Desc);
        query.min_liquidity = Some(50_000.0);
        query.min_volume_24h_usd = Some(100_000.0);
        query.min_trade_24h_count = Some(500);
        query.min_holder = Some(500);
        Self {
            name: "Volume Momentum".to_string(),
            query,
            min_consecutive_appearances: 3,
            filter: FilterSettings::VolumeMomentum(VolumeMomentumFilter::default()),
        }
    }

    pub fn recent_listings() -> Self {
        let mut query = TokenListQuery::new("recent_listing_time", SortType::Desc);
        query.min_liquidity = Some(20_000.0);
        query.min_trade_24h_count = Some(200);
        query.min_holder = Some(300);
        Self {
            name: "Recent Listings".to_string(),
            query,
            min_consecutive_appearances: 2,
            filter: FilterSettings::RecentListings(RecentListingsFilter::default()),
        }
    }

    pub fn price_momentum() -> Self {
        let mut query = TokenListQuery::new("price_change_24h_percent", SortType::Desc);
        query.min_liquidity = Some(50_000.0);
        query.min_volume_24h_usd = Some(100_000.0);
        query.min_trade_24h_count = Some(700);
        Self {
            name: "Price Momentum".to_string(),
            query,
            min_consecutive_appearances: 2,
            filter: FilterSettings::PriceMomentum(PriceMomentumFilter::default()),
        }
    }

    pub fn liquidity_growth() -> Self {
        let mut query = TokenListQuery::new("liquidity", SortType::Desc);
        query.min_market_cap = Some(1_000_000.0);
        query.min_volume_24h_usd = Some(200_000.0);
        query.min_holder = Some(1_000);
        Self {
            name: "Liquidity Growth".to_string(),
            query,
            min_consecutive_appearances: 3,
            filter: FilterSettings::LiquidityGrowth(LiquidityGrowthFilter::default()),
        }
    }

    pub fn high_trading_activity() -> Self {
        let mut query = TokenListQuery::new("trade_24h_count", SortType::Desc);
        query.min_liquidity = Some(150_000.0);
        query.min_holder = Some(2_000);
        Self {
            name: "High Trading Activity".to_string(),
            query,
            min_consecutive_appearances: 3,
            filter: FilterSettings::HighTradingActivity(TradingActivityFilter::default()),
        }
    }

    /// The five built-in strategies.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::volume_momentum(),
            Self::recent_listings(),
            Self::price_momentum(),
            Self::liquidity_growth(),
            Self::high_trading_activity(),
        ]
    }

    pub fn history_file_name(&self) -> String {
        history_file_name(&self.name)
    }

    // Validates the strategy parameters to ensure they're coherent
    pub fn validate(&self) -> Result<(), GemHunterError> {
        let invalid = |reason: String| -> Result<(), GemHunterError> { Err(GemHunterError::ConfigError(reason)) };

        if self.name.trim().is_empty() {
            return invalid("Strategy name must not be empty".to_string());
        }

        if self.query.sort_by.trim().is_empty() {
            return invalid(format!("{}: sort_by must not be empty", self.name));
        }

        if self.query.limit == 0 || self.query.limit > 100 {
            return invalid(format!("{}: limit must be between 1 and 100", self.name));
        }

        if self.min_consecutive_appearances == 0 {
            return invalid(format!("{}: min_consecutive_appearances must be at least 1", self.name));
        }

        self.filter
            .validate()
            .map_err(|e| GemHunterError::ConfigError(format!("{}: {}", self.name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_and_unique() {
        let strategies = StrategyConfig::defaults();
        assert_eq!(strategies.len(), 5);
        for strategy in &strategies {
            assert!(strategy.validate().is_ok(), "{} invalid", strategy.name);
        }

        let mut files: Vec<String> = strategies.iter().map(|s| s.history_file_name()).collect();
        files.sort();
        files.dedup();
        assert_eq!(files.len(), 5);
    }

    #[test]
    fn test_promising_thresholds() {
        assert_eq!(StrategyConfig::recent_listings().min_consecutive_appearances, 2);
        assert_eq!(StrategyConfig::price_momentum().min_consecutive_appearances, 2);
        assert_eq!(StrategyConfig::volume_momentum().min_consecutive_appearances, 3);
        assert_eq!(StrategyConfig::liquidity_growth().min_consecutive_appearances, 3);
        assert_eq!(StrategyConfig::high_trading_activity().min_consecutive_appearances, 3);
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut strategy = StrategyConfig::price_momentum();
        strategy.min_consecutive_appearances = 0;
        assert!(strategy.validate().is_err());

        let mut strategy = StrategyConfig::liquidity_growth();
        strategy.query.limit = 0;
        assert!(matches!(strategy.validate(), Err(GemHunterError::ConfigError(_))));
    }

    #[test]
    fn test_history_file_name() {
        assert_eq!(StrategyConfig::volume_momentum().history_file_name(), "volume_momentum.json");
    }
}
