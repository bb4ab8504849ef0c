pub mod clock;
pub mod kis;
pub mod registry;
pub mod scheduler;
pub mod trading;

pub use clock::MarketClock;
pub use kis::{KisBroker, KisConfig, TokenCache};
pub use registry::EngineRegistry;
pub use scheduler::{SchedulerConfig, TradingScheduler};
pub use trading::{TickInput, TradingEngine, TradingLoopResult};
