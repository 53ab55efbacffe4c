//! Trade execution pipeline and live price broadcasting.

pub mod hub;
pub mod service;

pub use hub::{PriceFeedHub, PriceUpdate};
pub use service::{
    CreateMarketRequest, Portfolio, PositionSummary, PriceQuote, TradeRequest, TradeResponse,
    TradeService,
};
