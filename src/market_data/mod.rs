// =============================================================================
// Market data — candles, completion buffering, provider interface
// =============================================================================

pub mod candle;
pub mod completion;
pub mod provider;

pub use candle::Candle;
pub use completion::CompletionBuffer;
pub use provider::{
    ConnectionState, ContractSpec, MarketDataProvider, ProviderErrorEvent, RawBarStream,
    ReplayMarketData,
};
