//! Alpha Vantage market data adapter

use super::{http_client, MarketDataTool};
use crate::config::MarketDataConfig;
use crate::error::OrchestrationError;
use crate::models::ToolResult;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Function selectors the financial specialist may choose from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketFunction {
    GlobalQuote,
    TimeSeriesIntraday,
    TimeSeriesDaily,
    Overview,
    Rsi,
    Sma,
    Ema,
}

impl MarketFunction {
    pub const ALL: [MarketFunction; 7] = [
        MarketFunction::GlobalQuote,
        MarketFunction::TimeSeriesIntraday,
        MarketFunction::TimeSeriesDaily,
        MarketFunction::Overview,
        MarketFunction::Rsi,
        MarketFunction::Sma,
        MarketFunction::Ema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketFunction::GlobalQuote => "GLOBAL_QUOTE",
            MarketFunction::TimeSeriesIntraday => "TIME_SERIES_INTRADAY",
            MarketFunction::TimeSeriesDaily => "TIME_SERIES_DAILY",
            MarketFunction::Overview => "OVERVIEW",
            MarketFunction::Rsi => "RSI",
            MarketFunction::Sma => "SMA",
            MarketFunction::Ema => "EMA",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            MarketFunction::GlobalQuote => "latest price, open/high/low, volume and daily change",
            MarketFunction::TimeSeriesIntraday => "most recent intraday bar (interval 1min..60min)",
            MarketFunction::TimeSeriesDaily => "most recent daily bar",
            MarketFunction::Overview => "company fundamentals (sector, market cap, P/E, EPS)",
            MarketFunction::Rsi => "14-period relative strength index",
            MarketFunction::Sma => "14-period simple moving average",
            MarketFunction::Ema => "14-period exponential moving average",
        }
    }

    /// Lenient parse of a selector named by the LLM
    pub fn from_selector(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "GLOBAL_QUOTE" | "QUOTE" | "PRICE" => Some(MarketFunction::GlobalQuote),
            "TIME_SERIES_INTRADAY" | "INTRADAY" => Some(MarketFunction::TimeSeriesIntraday),
            "TIME_SERIES_DAILY" | "DAILY" => Some(MarketFunction::TimeSeriesDaily),
            "OVERVIEW" | "COMPANY_OVERVIEW" | "FUNDAMENTALS" => Some(MarketFunction::Overview),
            "RSI" => Some(MarketFunction::Rsi),
            "SMA" => Some(MarketFunction::Sma),
            "EMA" => Some(MarketFunction::Ema),
            _ => None,
        }
    }

    fn is_indicator(&self) -> bool {
        matches!(self, MarketFunction::Rsi | MarketFunction::Sma | MarketFunction::Ema)
    }

    fn default_interval(&self) -> Option<&'static str> {
        match self {
            MarketFunction::TimeSeriesIntraday => Some("5min"),
            MarketFunction::Rsi | MarketFunction::Sma | MarketFunction::Ema => Some("daily"),
            _ => None,
        }
    }
}

impl fmt::Display for MarketFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One adapter call: selector + ticker (+ interval where relevant)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketCall {
    pub function: MarketFunction,
    pub symbol: String,
    pub interval: Option<String>,
}

impl MarketCall {
    pub fn new(function: MarketFunction, symbol: impl Into<String>) -> Self {
        let symbol: String = symbol.into();
        Self {
            function,
            symbol: symbol.trim().to_uppercase(),
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    fn effective_interval(&self) -> Option<&str> {
        self.interval
            .as_deref()
            .or_else(|| self.function.default_interval())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub latest_trading_day: String,
    pub previous_close: f64,
    pub change: f64,
    pub change_percent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorPoint {
    pub indicator: String,
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CompanyOverview {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    #[serde(rename = "MarketCapitalization")]
    pub market_cap: Option<String>,
    #[serde(rename = "PERatio")]
    pub pe_ratio: Option<String>,
    #[serde(rename = "EPS")]
    pub eps: Option<String>,
    pub dividend_yield: Option<String>,
    #[serde(rename = "52WeekHigh")]
    pub week_52_high: Option<String>,
    #[serde(rename = "52WeekLow")]
    pub week_52_low: Option<String>,
}

/// Successful adapter payload
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarketPayload {
    Quote(Quote),
    Series {
        symbol: String,
        interval: String,
        points: usize,
        latest: SeriesPoint,
    },
    Indicator {
        symbol: String,
        points: usize,
        latest: IndicatorPoint,
    },
    Overview(CompanyOverview),
}

/// Alpha Vantage API client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageClient {
    pub fn new(config: &MarketDataConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        })
    }

    /// Single request, no retry
    pub async fn query(&self, call: &MarketCall) -> Result<MarketPayload> {
        if call.symbol.is_empty() {
            return Err(OrchestrationError::AdapterData(
                "No ticker symbol supplied".to_string(),
            ));
        }

        let mut params: Vec<(&str, String)> = vec![
            ("function", call.function.as_str().to_string()),
            ("symbol", call.symbol.clone()),
            ("apikey", self.api_key.clone()),
        ];
        if let Some(interval) = call.effective_interval() {
            params.push(("interval", interval.to_string()));
        }
        if call.function.is_indicator() {
            params.push(("time_period", "14".to_string()));
            params.push(("series_type", "close".to_string()));
        }

        let response = self
            .client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::AdapterTransport(format!("Alpha Vantage request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(OrchestrationError::AdapterTransport(format!(
                "Alpha Vantage HTTP error: {}",
                response.status()
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            OrchestrationError::AdapterData(format!("Invalid JSON response: {}", e))
        })?;

        parse_response(call, &body)
    }
}

#[async_trait::async_trait]
impl MarketDataTool for AlphaVantageClient {
    fn name(&self) -> &'static str {
        "alpha_vantage"
    }

    async fn fetch(&self, call: &MarketCall) -> ToolResult<MarketPayload> {
        let result = self.query(call).await;

        match &result {
            Ok(_) => info!(function = %call.function, symbol = %call.symbol, "Market data retrieved"),
            Err(e) => warn!(function = %call.function, symbol = %call.symbol, error = %e, "Market data call failed"),
        }

        result.into()
    }
}

/// Interpret an Alpha Vantage JSON body for the given call
pub fn parse_response(call: &MarketCall, body: &Value) -> Result<MarketPayload> {
    if let Some(message) = body.get("Error Message") {
        return Err(OrchestrationError::AdapterData(format!(
            "Error: {} Check if the symbol is correct.",
            value_text(message)
        )));
    }
    for notice in ["Note", "Information"] {
        if let Some(message) = body.get(notice) {
            return Err(OrchestrationError::AdapterRateLimited(format!(
                "API notice: {}",
                value_text(message)
            )));
        }
    }

    match call.function {
        MarketFunction::GlobalQuote => parse_quote(body).map(MarketPayload::Quote),
        MarketFunction::TimeSeriesIntraday | MarketFunction::TimeSeriesDaily => {
            let interval = call.effective_interval().unwrap_or("Daily");
            let key = if call.function == MarketFunction::TimeSeriesDaily {
                "Time Series (Daily)".to_string()
            } else {
                format!("Time Series ({})", interval)
            };
            let series = expect_block(body, &key)?;
            let (timestamp, bar) = latest_entry(series, &key)?;

            Ok(MarketPayload::Series {
                symbol: call.symbol.clone(),
                interval: interval.to_string(),
                points: series.len(),
                latest: SeriesPoint {
                    timestamp: timestamp.to_string(),
                    open: field_f64(bar, "1. open")?,
                    high: field_f64(bar, "2. high")?,
                    low: field_f64(bar, "3. low")?,
                    close: field_f64(bar, "4. close")?,
                    volume: field_u64(bar, "5. volume")?,
                },
            })
        }
        MarketFunction::Rsi | MarketFunction::Sma | MarketFunction::Ema => {
            let name = call.function.as_str();
            let key = format!("Technical Analysis: {}", name);
            let series = expect_block(body, &key)?;
            let (date, values) = latest_entry(series, &key)?;

            Ok(MarketPayload::Indicator {
                symbol: call.symbol.clone(),
                points: series.len(),
                latest: IndicatorPoint {
                    indicator: name.to_string(),
                    date: date.to_string(),
                    value: field_f64(values, name)?,
                },
            })
        }
        MarketFunction::Overview => {
            if body.get("Symbol").is_none() {
                return Err(OrchestrationError::AdapterData(format!(
                    "No overview data returned for {}",
                    call.symbol
                )));
            }
            let overview: CompanyOverview = serde_json::from_value(body.clone()).map_err(|e| {
                OrchestrationError::AdapterData(format!("Malformed overview data: {}", e))
            })?;
            Ok(MarketPayload::Overview(overview))
        }
    }
}

fn parse_quote(body: &Value) -> Result<Quote> {
    let quote = expect_block(body, "Global Quote")?;

    Ok(Quote {
        symbol: field_str(quote, "01. symbol")?,
        open: field_f64(quote, "02. open")?,
        high: field_f64(quote, "03. high")?,
        low: field_f64(quote, "04. low")?,
        price: field_f64(quote, "05. price")?,
        volume: field_u64(quote, "06. volume")?,
        latest_trading_day: field_str(quote, "07. latest trading day")?,
        previous_close: field_f64(quote, "08. previous close")?,
        change: field_f64(quote, "09. change")?,
        change_percent: field_str(quote, "10. change percent")?,
    })
}

fn expect_block<'a>(body: &'a Value, key: &str) -> Result<&'a Map<String, Value>> {
    body.get(key)
        .and_then(Value::as_object)
        .filter(|block| !block.is_empty())
        .ok_or_else(|| {
            OrchestrationError::AdapterData(format!(
                "Unexpected API response: no '{}' data found",
                key
            ))
        })
}

/// Entry with the greatest timestamp key; Alpha Vantage timestamps sort
/// lexicographically.
fn latest_entry<'a>(
    series: &'a Map<String, Value>,
    key: &str,
) -> Result<(&'a str, &'a Map<String, Value>)> {
    series
        .iter()
        .max_by(|a, b| a.0.cmp(b.0))
        .and_then(|(ts, v)| v.as_object().map(|obj| (ts.as_str(), obj)))
        .ok_or_else(|| OrchestrationError::AdapterData(format!("Malformed '{}' entries", key)))
}

fn field_str(obj: &Map<String, Value>, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OrchestrationError::AdapterData(format!("Missing field '{}'", key)))
}

fn field_f64(obj: &Map<String, Value>, key: &str) -> Result<f64> {
    let raw = field_str(obj, key)?;
    raw.trim().parse().map_err(|_| {
        OrchestrationError::AdapterData(format!("Field '{}' is not numeric: {:?}", key, raw))
    })
}

fn field_u64(obj: &Map<String, Value>, key: &str) -> Result<u64> {
    let raw = field_str(obj, key)?;
    raw.trim().parse().map_err(|_| {
        OrchestrationError::AdapterData(format!("Field '{}' is not an integer: {:?}", key, raw))
    })
}

fn value_text(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}
