use crate::TradingMode;

/// Which broker backend the daemon drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Real KIS open API (or its mock VTS endpoint, per `KIS_IS_MOCK`).
    Live,
    /// In-process simulated broker. No network calls.
    Paper,
}

/// All configuration loaded from environment variables at startup.
/// Missing required variables cause an immediate panic with a clear message.
#[derive(Debug, Clone)]
pub struct Config {
    // KIS open API credentials
    pub kis_app_key: String,
    pub kis_app_secret: String,
    /// Account number, format `XXXXXXXX-XX`.
    pub kis_account_no: String,
    /// True targets the KIS mock (VTS) endpoint.
    pub kis_is_mock: bool,

    // Telegram (optional — alerts are stored even without a notifier)
    pub telegram_token: Option<String>,

    // Trading
    pub trading_mode: TradingMode,
    pub execution: Execution,

    // Scheduler
    pub market_tz: String,
    pub tick_interval_min: u32,
    pub tick_deadline_secs: u64,
    pub max_concurrent_broker_calls: usize,

    // Database
    pub database_url: String,

    // Risk config file path (TOML); defaults apply when absent
    pub risk_config_path: Option<String>,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on any missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let execution = match optional_env("EXECUTION").as_deref() {
            None | Some("live") => Execution::Live,
            Some("paper") => Execution::Paper,
            Some(other) => panic!("EXECUTION must be 'live' or 'paper', got: '{other}'"),
        };

        let trading_mode = required_env("TRADING_MODE")
            .parse::<TradingMode>()
            .unwrap_or_else(|e| panic!("{e}"));

        // KIS credentials are only required when actually talking to KIS.
        let (kis_app_key, kis_app_secret, kis_account_no) = match execution {
            Execution::Live => (
                required_env("KIS_APP_KEY"),
                required_env("KIS_APP_SECRET"),
                required_env("KIS_ACCOUNT_NO"),
            ),
            Execution::Paper => (
                optional_env("KIS_APP_KEY").unwrap_or_default(),
                optional_env("KIS_APP_SECRET").unwrap_or_default(),
                optional_env("KIS_ACCOUNT_NO").unwrap_or_default(),
            ),
        };

        Config {
            kis_app_key,
            kis_app_secret,
            kis_account_no,
            kis_is_mock: optional_env("KIS_IS_MOCK")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            telegram_token: optional_env("TELEGRAM_TOKEN"),
            trading_mode,
            execution,
            market_tz: optional_env("MARKET_TZ").unwrap_or_else(|| "Asia/Seoul".to_string()),
            tick_interval_min: optional_env("TICK_INTERVAL_MIN")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            tick_deadline_secs: optional_env("TICK_DEADLINE_SEC")
                .and_then(|v| v.parse().ok())
                .unwrap_or(240),
            max_concurrent_broker_calls: optional_env("MAX_CONCURRENT_BROKER_CALLS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            database_url: required_env("DATABASE_URL"),
            risk_config_path: optional_env("RISK_CONFIG_PATH"),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
