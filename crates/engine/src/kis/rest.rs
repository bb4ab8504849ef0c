use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use common::{
    Balance, BrokerClient, Error, OrderResult, OrderSide, OrderStatus, Position, PriceBar, Result,
    StockPrice,
};

use super::token::{TokenCache, TokenKey};

const MOCK_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";
const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";

/// Response codes KIS sends when the access token has lapsed.
const TOKEN_EXPIRED_CODES: [&str; 2] = ["EGW00123", "EGW00121"];

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct KisConfig {
    pub app_key: String,
    pub app_secret: String,
    /// Format `XXXXXXXX-XX`.
    pub account_no: String,
    /// True targets the mock (VTS) endpoint for paper accounts.
    pub is_mock: bool,
    /// Bound on in-flight quote requests when fanning out a batch.
    pub max_concurrent_calls: usize,
}

/// Korea Investment & Securities open-API client.
///
/// Transport failures are retried up to three times with a linear 1-second
/// backoff; a token-expired response triggers one re-auth and one retry;
/// provider-reported errors (`rt_cd != "0"`) surface as-is and are never
/// retried.
pub struct KisBroker {
    cfg: KisConfig,
    http: Client,
    tokens: Arc<TokenCache>,
}

impl KisBroker {
    pub fn new(cfg: KisConfig, tokens: Arc<TokenCache>) -> Self {
        let http = Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self { cfg, http, tokens }
    }

    fn base_url(&self) -> &'static str {
        if self.cfg.is_mock {
            MOCK_BASE_URL
        } else {
            REAL_BASE_URL
        }
    }

    fn token_key(&self) -> TokenKey {
        TokenKey {
            app_key: self.cfg.app_key.clone(),
            account_no: self.cfg.account_no.clone(),
            is_mock: self.cfg.is_mock,
        }
    }

    /// `(CANO, ACNT_PRDT_CD)` halves of the account number.
    fn account_parts(&self) -> (String, String) {
        let mut parts = self.cfg.account_no.splitn(2, '-');
        let cano = parts.next().unwrap_or("").to_string();
        let prdt = parts.next().unwrap_or("01").to_string();
        (cano, prdt)
    }

    async fn issue_token(&self) -> Result<String> {
        let url = format!("{}/oauth2/tokenP", self.base_url());
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": self.cfg.app_key,
            "appsecret": self.cfg.app_secret,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let data: Value = resp.json().await.map_err(|e| Error::Transport(e.to_string()))?;

        match data.get("access_token").and_then(Value::as_str) {
            Some(token) => {
                debug!(mock = self.cfg.is_mock, "KIS access token issued");
                Ok(token.to_string())
            }
            None => Err(Error::Auth(text(&data, "error_description"))),
        }
    }

    /// Cached token, or a freshly issued one. Issuance is serialized so
    /// concurrent callers sharing credentials cannot stampede the endpoint.
    async fn bearer(&self) -> Result<String> {
        let key = self.token_key();
        if let Some(token) = self.tokens.get(&key).await {
            return Ok(token);
        }
        let _issuing = self.tokens.lock_issuance().await;
        // Another caller may have finished issuing while we waited.
        if let Some(token) = self.tokens.get(&key).await {
            return Ok(token);
        }
        let token = self.issue_token().await?;
        self.tokens.put(key, token.clone()).await;
        Ok(token)
    }

    async fn send_with_retry(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let mut last_error = String::new();
        for attempt in 1..=MAX_RETRIES {
            let attempt_req = req
                .try_clone()
                .ok_or_else(|| Error::Other("request body not clonable".to_string()))?;
            match attempt_req.send().await {
                Ok(resp) => {
                    return resp.json::<Value>().await.map_err(|e| Error::Transport(e.to_string()))
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < MAX_RETRIES {
                        sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(Error::Transport(format!("network error after {MAX_RETRIES} retries: {last_error}")))
    }

    async fn get_once(&self, url: &str, tr_id: &str, params: &[(&str, &str)]) -> Result<Value> {
        let token = self.bearer().await?;
        let req = self
            .http
            .get(url)
            .query(params)
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.cfg.app_key)
            .header("appsecret", &self.cfg.app_secret)
            .header("tr_id", tr_id);
        self.send_with_retry(req).await
    }

    async fn post_once(&self, url: &str, tr_id: &str, body: &Value) -> Result<Value> {
        let token = self.bearer().await?;
        let req = self
            .http
            .post(url)
            .json(body)
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", &self.cfg.app_key)
            .header("appsecret", &self.cfg.app_secret)
            .header("tr_id", tr_id);
        self.send_with_retry(req).await
    }

    /// GET with transparent token refresh: one re-auth, one retry. A second
    /// token-expired response in a row is surfaced, not retried again.
    async fn call_get(&self, path: &str, tr_id: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url(), path);
        let data = self.get_once(&url, tr_id, params).await?;
        if is_token_expired(&data) {
            warn!(tr_id, "KIS token expired; re-authenticating");
            self.tokens.invalidate(&self.token_key()).await;
            let data = self.get_once(&url, tr_id, params).await?;
            if is_token_expired(&data) {
                return Err(Error::TokenExpired);
            }
            return Ok(data);
        }
        Ok(data)
    }

    async fn call_post(&self, path: &str, tr_id: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url(), path);
        let data = self.post_once(&url, tr_id, body).await?;
        if is_token_expired(&data) {
            warn!(tr_id, "KIS token expired; re-authenticating");
            self.tokens.invalidate(&self.token_key()).await;
            let data = self.post_once(&url, tr_id, body).await?;
            if is_token_expired(&data) {
                return Err(Error::TokenExpired);
            }
            return Ok(data);
        }
        Ok(data)
    }

    async fn get_stock_price(&self, code: &str) -> Result<StockPrice> {
        let params = [("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", code)];
        let data = self
            .call_get("/uapi/domestic-stock/v1/quotations/inquire-price", "FHKST01010100", &params)
            .await?;
        ensure_ok(&data)?;
        Ok(parse_stock_price(code, &data["output"]))
    }

    fn balance_params(cano: &str, prdt: &str) -> Vec<(&'static str, String)> {
        vec![
            ("CANO", cano.to_string()),
            ("ACNT_PRDT_CD", prdt.to_string()),
            ("AFHR_FLPR_YN", "N".to_string()),
            ("OFL_YN", String::new()),
            ("INQR_DVSN", "02".to_string()),
            ("UNPR_DVSN", "01".to_string()),
            ("FUND_STTL_ICLD_YN", "N".to_string()),
            ("FNCG_AMT_AUTO_RDPT_YN", "N".to_string()),
            ("PRCS_DVSN", "00".to_string()),
            ("CTX_AREA_FK100", String::new()),
            ("CTX_AREA_NK100", String::new()),
        ]
    }

    async fn inquire_balance(&self) -> Result<Value> {
        let tr_id = if self.cfg.is_mock { "VTTC8434R" } else { "TTTC8434R" };
        let (cano, prdt) = self.account_parts();
        let owned = Self::balance_params(&cano, &prdt);
        let params: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let data = self
            .call_get("/uapi/domestic-stock/v1/trading/inquire-balance", tr_id, &params)
            .await?;
        ensure_ok(&data)?;
        Ok(data)
    }
}

#[async_trait]
impl BrokerClient for KisBroker {
    async fn authenticate(&self) -> Result<()> {
        let _issuing = self.tokens.lock_issuance().await;
        let token = self.issue_token().await?;
        self.tokens.put(self.token_key(), token).await;
        Ok(())
    }

    async fn get_stock_prices(&self, codes: &[String]) -> Result<Vec<StockPrice>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        // Fan out with bounded concurrency, preserving input order.
        let futs: Vec<_> = codes
            .iter()
            .map(|code| Box::pin(self.get_stock_price(code)) as std::pin::Pin<Box<dyn std::future::Future<Output = Result<StockPrice>> + Send + '_>>)
            .collect();
        stream::iter(futs)
            .buffered(self.cfg.max_concurrent_calls.max(1))
            .try_collect()
            .await
    }

    async fn get_daily_prices(&self, code: &str, count: usize) -> Result<Vec<PriceBar>> {
        let params = [
            ("FID_COND_MRKT_DIV_CODE", "J"),
            ("FID_INPUT_ISCD", code),
            ("FID_PERIOD_DIV_CODE", "D"),
            ("FID_ORG_ADJ_PRC", "0"),
        ];
        let data = self
            .call_get(
                "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
                "FHKST01010400",
                &params,
            )
            .await?;
        ensure_ok(&data)?;
        Ok(parse_daily_bars(&data["output2"], count))
    }

    async fn place_order(
        &self,
        code: &str,
        side: OrderSide,
        quantity: u32,
        price: Option<f64>,
    ) -> Result<OrderResult> {
        let tr_id = order_tr_id(self.cfg.is_mock, side);
        let (cano, prdt) = self.account_parts();

        // ORD_DVSN: 00 = limit, 01 = market.
        let (ord_dvsn, ord_unpr) = match price {
            Some(p) => ("00", format!("{}", p as i64)),
            None => ("01", "0".to_string()),
        };

        let body = json!({
            "CANO": cano,
            "ACNT_PRDT_CD": prdt,
            "PDNO": code,
            "ORD_DVSN": ord_dvsn,
            "ORD_QTY": quantity.to_string(),
            "ORD_UNPR": ord_unpr,
        });

        debug!(code, side = %side, quantity, "submitting order to KIS");
        let data = self
            .call_post("/uapi/domestic-stock/v1/trading/order-cash", tr_id, &body)
            .await?;

        if text(&data, "rt_cd") == "0" {
            Ok(OrderResult {
                success: true,
                order_id: data["output"].get("ODNO").and_then(Value::as_str).map(String::from),
                message: text(&data, "msg1"),
                status: OrderStatus::Pending,
            })
        } else {
            Ok(OrderResult {
                success: false,
                order_id: None,
                message: text(&data, "msg1"),
                status: OrderStatus::Failed,
            })
        }
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        let data = self.inquire_balance().await?;
        Ok(parse_positions(&data["output1"]))
    }

    async fn get_balance(&self) -> Result<Balance> {
        let data = self.inquire_balance().await?;
        Ok(parse_balance(&data["output2"]))
    }
}

fn is_token_expired(data: &Value) -> bool {
    let code = text(data, "msg_cd");
    TOKEN_EXPIRED_CODES.contains(&code.as_str())
}

fn ensure_ok(data: &Value) -> Result<()> {
    if text(data, "rt_cd") == "0" {
        Ok(())
    } else {
        Err(Error::Api(text(data, "msg1")))
    }
}

fn order_tr_id(is_mock: bool, side: OrderSide) -> &'static str {
    match (is_mock, side) {
        (true, OrderSide::Buy) => "VTTC0802U",
        (true, OrderSide::Sell) => "VTTC0801U",
        (false, OrderSide::Buy) => "TTTC0802U",
        (false, OrderSide::Sell) => "TTTC0801U",
    }
}

// KIS encodes every numeric field as a string; fall back to 0 on anything
// unparsable, matching how absent fields behave.
fn text(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

fn num(v: &Value, key: &str) -> f64 {
    match v.get(key) {
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn int(v: &Value, key: &str) -> u64 {
    num(v, key) as u64
}

fn parse_stock_price(code: &str, output: &Value) -> StockPrice {
    StockPrice {
        code: code.to_string(),
        name: text(output, "hts_kor_isnm"),
        current_price: num(output, "stck_prpr"),
        open: num(output, "stck_oprc"),
        high: num(output, "stck_hgpr"),
        low: num(output, "stck_lwpr"),
        change_rate: num(output, "prdy_ctrt"),
        volume: int(output, "acml_vol"),
    }
}

/// The daily-price endpoint returns newest-first; indicator input must be
/// oldest-first, so the kept window is reversed here.
fn parse_daily_bars(output: &Value, count: usize) -> Vec<PriceBar> {
    let rows = output.as_array().map(Vec::as_slice).unwrap_or(&[]);
    let mut bars: Vec<PriceBar> = rows
        .iter()
        .take(count)
        .filter_map(|item| {
            let date = NaiveDate::parse_from_str(&text(item, "stck_bsop_date"), "%Y%m%d").ok()?;
            Some(PriceBar {
                date,
                open: num(item, "stck_oprc"),
                high: num(item, "stck_hgpr"),
                low: num(item, "stck_lwpr"),
                close: num(item, "stck_clpr"),
                volume: int(item, "acml_vol"),
            })
        })
        .collect();
    bars.reverse();
    bars
}

fn parse_positions(output: &Value) -> Vec<Position> {
    let rows = output.as_array().map(Vec::as_slice).unwrap_or(&[]);
    rows.iter()
        .filter(|item| int(item, "hldg_qty") > 0)
        .map(|item| Position {
            stock_code: text(item, "pdno"),
            stock_name: text(item, "prdt_name"),
            quantity: int(item, "hldg_qty") as u32,
            avg_price: num(item, "pchs_avg_pric"),
            current_price: num(item, "prpr"),
            profit_loss: num(item, "evlu_pfls_amt"),
            profit_loss_rate: num(item, "evlu_pfls_rt"),
        })
        .collect()
}

fn parse_balance(output: &Value) -> Balance {
    let first = output.get(0).cloned().unwrap_or(Value::Null);
    Balance {
        deposit: num(&first, "dnca_tot_amt"),
        available_amount: num(&first, "nxdy_excc_amt"),
        total_evaluation: num(&first, "tot_evlu_amt"),
        net_worth: num(&first, "nass_amt"),
        purchase_amount: num(&first, "pchs_amt_smtl_amt"),
        evaluation_amount: num(&first, "evlu_amt_smtl_amt"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_tr_ids_split_by_mode_and_side() {
        assert_eq!(order_tr_id(true, OrderSide::Buy), "VTTC0802U");
        assert_eq!(order_tr_id(true, OrderSide::Sell), "VTTC0801U");
        assert_eq!(order_tr_id(false, OrderSide::Buy), "TTTC0802U");
        assert_eq!(order_tr_id(false, OrderSide::Sell), "TTTC0801U");
    }

    #[test]
    fn token_expiry_codes_are_detected() {
        assert!(is_token_expired(&json!({"msg_cd": "EGW00123"})));
        assert!(is_token_expired(&json!({"msg_cd": "EGW00121"})));
        assert!(!is_token_expired(&json!({"msg_cd": "MCA00000"})));
        assert!(!is_token_expired(&json!({})));
    }

    #[test]
    fn provider_error_surfaces_message() {
        let err = ensure_ok(&json!({"rt_cd": "1", "msg1": "invalid stock code"})).unwrap_err();
        assert!(err.to_string().contains("invalid stock code"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn stock_price_parses_stringly_typed_fields() {
        let output = json!({
            "hts_kor_isnm": "삼성전자",
            "stck_prpr": "71000",
            "stck_oprc": "70500",
            "stck_hgpr": "71500",
            "stck_lwpr": "70000",
            "prdy_ctrt": "1.42",
            "acml_vol": "13250000",
        });
        let price = parse_stock_price("005930", &output);
        assert_eq!(price.name, "삼성전자");
        assert_eq!(price.current_price, 71_000.0);
        assert_eq!(price.change_rate, 1.42);
        assert_eq!(price.volume, 13_250_000);
    }

    #[test]
    fn daily_bars_normalize_to_oldest_first() {
        let output = json!([
            {"stck_bsop_date": "20250103", "stck_clpr": "103", "stck_oprc": "102",
             "stck_hgpr": "104", "stck_lwpr": "101", "acml_vol": "300"},
            {"stck_bsop_date": "20250102", "stck_clpr": "102", "stck_oprc": "101",
             "stck_hgpr": "103", "stck_lwpr": "100", "acml_vol": "200"},
            {"stck_bsop_date": "20250101", "stck_clpr": "101", "stck_oprc": "100",
             "stck_hgpr": "102", "stck_lwpr": "99", "acml_vol": "100"},
        ]);
        let bars = parse_daily_bars(&output, 2);
        assert_eq!(bars.len(), 2);
        assert!(bars[0].date < bars[1].date);
        assert_eq!(bars[0].close, 102.0);
        assert_eq!(bars[1].close, 103.0);
    }

    #[test]
    fn positions_skip_zero_quantity_rows() {
        let output = json!([
            {"pdno": "005930", "prdt_name": "Samsung", "hldg_qty": "10",
             "pchs_avg_pric": "68000", "prpr": "71000",
             "evlu_pfls_amt": "30000", "evlu_pfls_rt": "4.41"},
            {"pdno": "000660", "prdt_name": "SK Hynix", "hldg_qty": "0",
             "pchs_avg_pric": "0", "prpr": "0",
             "evlu_pfls_amt": "0", "evlu_pfls_rt": "0"},
        ]);
        let positions = parse_positions(&output);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].stock_code, "005930");
        assert_eq!(positions[0].quantity, 10);
    }

    #[test]
    fn balance_reads_first_output_row() {
        let output = json!([{
            "dnca_tot_amt": "5000000",
            "nxdy_excc_amt": "4800000",
            "tot_evlu_amt": "10500000",
            "nass_amt": "10400000",
            "pchs_amt_smtl_amt": "5000000",
            "evlu_amt_smtl_amt": "5500000",
        }]);
        let balance = parse_balance(&output);
        assert_eq!(balance.available_amount, 4_800_000.0);
        assert_eq!(balance.total_evaluation, 10_500_000.0);
    }
}
