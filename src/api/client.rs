//! Signed HTTP client for the FoxESS Cloud OpenAPI

use reqwest::header::{CONNECTION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::api::settings::canonical_setting_key;
use crate::api::signer::{Throttle, sign, timestamp_ms};
use crate::api::types::{
    BatterySoc, DEFAULT_REPORT_VARIABLES, DeviceListPage, Generation, Inverter, InverterDetail,
    ProductionPoint, RealTimeApiVersion, RealTimeData, RealTimeSnapshot, ReportQuery, ScalarValue,
    SchedulerInfo, SchedulerSetRequest, SettingItem, SettingWriteResult,
};
use crate::config::{ApiConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::{FoxessError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::tracker::ApiCallTracker;

/// Upper bound on pages fetched by [`FoxessClient::list_all_inverters`]
const MAX_LIST_PAGES: u32 = 100;

fn build_http(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// FoxESS Cloud API client
///
/// One instance per API key. All requests share a single throttle gate and,
/// when attached, a call tracker.
pub struct FoxessClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    lang: String,
    timezone: String,
    user_agent: String,
    debug: bool,
    throttle: Throttle,
    tracker: Option<Arc<ApiCallTracker>>,
    logger: StructuredLogger,
}

impl FoxessClient {
    /// Create a client from the `api` section of the configuration
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let http = build_http(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))?;
        Ok(Self {
            http,
            api_key: config.api_key.trim().to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            lang: config.lang.clone(),
            timezone: config.timezone.clone(),
            user_agent: config.user_agent.clone(),
            debug: config.debug,
            throttle: Throttle::new(config.min_interval()),
            tracker: None,
            logger: get_logger("api"),
        })
    }

    /// Create a client with default settings for `api_key`
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = ApiConfig {
            api_key: api_key.into(),
            ..ApiConfig::default()
        };
        Self::from_config(&config)
    }

    /// Attach a tracker notified before every request
    pub fn with_call_tracker(mut self, tracker: Arc<ApiCallTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Replace the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    /// Replace the minimum gap between requests
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.throttle = Throttle::new(min_interval);
        self
    }

    pub fn call_tracker(&self) -> Option<&Arc<ApiCallTracker>> {
        self.tracker.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List one page of inverters visible to the key
    pub async fn list_inverters(&self, page: u32, page_size: u32) -> Result<Vec<Inverter>> {
        Ok(self.list_inverters_page(page, page_size).await?.data)
    }

    /// Fetch one page of the device list including paging metadata
    pub async fn list_inverters_page(&self, page: u32, page_size: u32) -> Result<DeviceListPage> {
        let body = json!({"currentPage": page, "pageSize": page_size});
        let result = self.post("/op/v0/device/list", &body).await?;
        if result.is_null() {
            return Ok(DeviceListPage::default());
        }
        parse_result(result, "device list")
    }

    /// Walk the device list until a short page or the reported total
    pub async fn list_all_inverters(&self, page_size: u32) -> Result<Vec<Inverter>> {
        let page_size = page_size.max(1);
        let mut devices = Vec::new();
        for page in 1..=MAX_LIST_PAGES {
            let batch = self.list_inverters_page(page, page_size).await?;
            let fetched = batch.data.len();
            devices.extend(batch.data);
            let reached_total = batch
                .total
                .is_some_and(|total| devices.len() >= total as usize);
            if fetched < page_size as usize || reached_total {
                break;
            }
        }
        Ok(devices)
    }

    /// Read a device setting; `key` may use any spelling of an allowed key
    pub async fn get_setting(&self, sn: &str, key: &str) -> Result<SettingItem> {
        let key = canonical_setting_key(key)?;
        let result = self
            .post("/op/v0/device/setting/get", &json!({"sn": sn, "key": key}))
            .await?;
        if result.is_null() {
            return Ok(SettingItem::default());
        }
        parse_result(result, "setting")
    }

    /// Write a device setting
    pub async fn set_setting(
        &self,
        sn: &str,
        key: &str,
        value: impl Into<ScalarValue>,
    ) -> Result<SettingWriteResult> {
        let key = canonical_setting_key(key)?;
        let body = json!({"sn": sn, "key": key, "value": value.into()});
        let result = self.post("/op/v0/device/setting/set", &body).await?;
        if result.is_null() {
            return Ok(SettingWriteResult::default());
        }
        parse_result(result, "setting write")
    }

    pub async fn get_device_detail(&self, sn: &str) -> Result<InverterDetail> {
        let result = self.get("/op/v1/device/detail", &[("sn", sn)]).await?;
        parse_result(result, "device detail")
    }

    pub async fn get_battery_soc(&self, sn: &str) -> Result<BatterySoc> {
        let result = self
            .get("/op/v0/device/battery/soc/get", &[("sn", sn)])
            .await?;
        parse_result(result, "battery soc")
    }

    pub async fn get_generation(&self, sn: &str) -> Result<Generation> {
        let result = self.get("/op/v0/device/generation", &[("sn", sn)]).await?;
        parse_result(result, "generation")
    }

    /// Query the production report; month and day are sent only when set
    pub async fn get_production_report(&self, query: &ReportQuery) -> Result<Vec<ProductionPoint>> {
        let variables: Vec<String> = if query.variables.is_empty() {
            DEFAULT_REPORT_VARIABLES.iter().map(|v| v.to_string()).collect()
        } else {
            query.variables.clone()
        };

        let mut body = Map::new();
        body.insert("sn".into(), json!(query.sn));
        body.insert("dimension".into(), json!(query.dimension.as_str()));
        body.insert("year".into(), json!(query.year));
        if let Some(month) = query.month {
            body.insert("month".into(), json!(month));
        }
        if let Some(day) = query.day {
            body.insert("day".into(), json!(day));
        }
        body.insert("variables".into(), json!(variables));

        let result = self
            .post("/op/v0/device/report/query", &Value::Object(body))
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        parse_result(result, "production report")
    }

    /// Query real-time readings for one (v0) or more (v1) devices
    pub async fn get_real_time_data(
        &self,
        sns: &[String],
        variables: &[String],
        api_version: RealTimeApiVersion,
    ) -> Result<Vec<RealTimeData>> {
        if sns.is_empty() {
            return Err(FoxessError::api(
                "sns must contain at least one serial number",
            ));
        }

        let mut body = Map::new();
        match api_version {
            RealTimeApiVersion::V0 => {
                if sns.len() != 1 {
                    return Err(FoxessError::api(
                        "v0 real-time query accepts exactly one sn",
                    ));
                }
                body.insert("sn".into(), json!(sns[0]));
            }
            RealTimeApiVersion::V1 => {
                body.insert("sns".into(), json!(sns));
            }
        }
        if !variables.is_empty() {
            body.insert("variables".into(), json!(variables));
        }

        let path = format!("/op/{}/device/real/query", api_version.as_str());
        let result = self.post(&path, &Value::Object(body)).await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        parse_result(result, "real-time data")
    }

    /// Real-time readings for a single device; an empty answer yields an
    /// empty snapshot for `sn`
    pub async fn get_real_time_snapshot(
        &self,
        sn: &str,
        variables: &[String],
        api_version: RealTimeApiVersion,
    ) -> Result<RealTimeSnapshot> {
        let data = self
            .get_real_time_data(&[sn.to_string()], variables, api_version)
            .await?;
        Ok(data
            .into_iter()
            .next()
            .map(RealTimeSnapshot::from_realtime)
            .unwrap_or_else(|| RealTimeSnapshot::empty(sn)))
    }

    pub async fn get_scheduler(&self, sn: &str) -> Result<SchedulerInfo> {
        let result = self
            .post("/op/v1/device/scheduler/get", &json!({"deviceSN": sn}))
            .await?;
        parse_result(result, "scheduler")
    }

    /// Replace the device's whole scheduler group list
    pub async fn set_scheduler(&self, request: &SchedulerSetRequest) -> Result<()> {
        for group in &request.groups {
            group.validate()?;
        }
        let body = serde_json::to_value(request)?;
        self.post("/op/v1/device/scheduler/enable", &body).await?;
        self.logger.info(&format!(
            "Scheduler updated for {} with {} group(s)",
            request.device_sn,
            request.groups.len()
        ));
        Ok(())
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::GET, path, query, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// Throttle, count, sign and send one request, returning the envelope's
    /// `result`
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        self.throttle.wait().await;
        if let Some(tracker) = &self.tracker {
            tracker.record();
        }

        let timestamp = timestamp_ms();
        let signature = sign(path, &self.api_key, &timestamp);
        let url = format!("{}{}", self.base_url, path);

        if self.debug {
            self.logger.debug(&format!(
                "{} {} query={:?} body={}",
                method,
                path,
                query,
                body.map(Value::to_string).unwrap_or_default()
            ));
        }

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json")
            .header("Token", &self.api_key)
            .header("Signature", signature)
            .header("Timestamp", &timestamp)
            .header("Lang", &self.lang)
            .header("Timezone", &self.timezone)
            .header(USER_AGENT, &self.user_agent)
            .header(CONNECTION, "close");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            FoxessError::connection(format!("{} {} failed: {}", method, path, e))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FoxessError::auth(format!(
                "{} {} rejected with HTTP 401",
                method, path
            )));
        }
        if !status.is_success() {
            return Err(FoxessError::connection(format!(
                "{} {} returned HTTP {}",
                method, path, status
            )));
        }

        let text = response.text().await.map_err(|e| {
            FoxessError::connection(format!("Reading {} response failed: {}", path, e))
        })?;
        let payload: Value = serde_json::from_str(&text).map_err(|e| {
            FoxessError::api(format!("Response from {} is not valid JSON: {}", path, e))
        })?;

        match check_envelope(payload) {
            Ok(result) => Ok(result),
            Err(err) => {
                if self.debug {
                    self.logger
                        .debug(&format!("{} {} failed: {}", method, path, err));
                }
                Err(err)
            }
        }
    }
}

/// Classify a decoded response envelope
///
/// `errno == 0` yields `result` (null when absent); 401 and 403 are
/// authentication failures; any other code, a missing or non-integer
/// `errno`, or a non-object body is an API error.
pub fn check_envelope(payload: Value) -> Result<Value> {
    let Value::Object(mut envelope) = payload else {
        return Err(FoxessError::api(
            "Unexpected response format: expected a JSON object",
        ));
    };

    let errno = match envelope.get("errno") {
        None | Some(Value::Null) => {
            return Err(FoxessError::api("Missing errno in response"));
        }
        Some(value) => value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| FoxessError::api(format!("Non-numeric errno in response: {}", value)))?,
    };

    if errno == 0 {
        return Ok(envelope.remove("result").unwrap_or(Value::Null));
    }

    let message = ["msg", "message", "error"]
        .iter()
        .find_map(|key| {
            envelope
                .get(*key)
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty())
        })
        .unwrap_or("no message")
        .to_string();

    if errno == 401 || errno == 403 {
        return Err(FoxessError::auth(format!("errno {}: {}", errno, message)));
    }
    Err(FoxessError::api_code(errno, message))
}

/// Deserialize an envelope `result`, naming the failing field path
pub fn parse_result<T: DeserializeOwned>(result: Value, what: &str) -> Result<T> {
    serde_path_to_error::deserialize(result).map_err(|err| {
        FoxessError::api(format!(
            "Invalid {} payload at '{}': {}",
            what,
            err.path(),
            err.inner()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ReportDimension;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> FoxessClient {
        let config = ApiConfig {
            api_key: "test-key".to_string(),
            base_url: server.url(),
            ..ApiConfig::default()
        };
        FoxessClient::from_config(&config)
            .unwrap()
            .with_min_interval(Duration::ZERO)
    }

    #[test]
    fn envelope_success_returns_result() {
        let result = check_envelope(json!({"errno": 0, "result": {"a": 1}})).unwrap();
        assert_eq!(result, json!({"a": 1}));
        assert_eq!(check_envelope(json!({"errno": 0})).unwrap(), Value::Null);

        let result = check_envelope(json!({"errno": 0.0, "result": {"a": 1}})).unwrap();
        assert_eq!(result, json!({"a": 1}));
        let err = check_envelope(json!({"errno": 41013.0, "msg": "invalid token"})).unwrap_err();
        assert_eq!(err.code(), Some(41013));
    }

    #[test]
    fn envelope_error_classification() {
        let err = check_envelope(json!({"errno": 41013, "msg": "invalid token"})).unwrap_err();
        assert_eq!(err.code(), Some(41013));
        assert!(err.to_string().contains("invalid token"));

        let err = check_envelope(json!({"errno": 40000, "message": "from message"})).unwrap_err();
        assert!(err.to_string().contains("from message"));

        let err = check_envelope(json!({"errno": 40001, "error": "from error"})).unwrap_err();
        assert!(err.to_string().contains("from error"));

        assert!(check_envelope(json!({"errno": 403, "msg": "forbidden"})).unwrap_err().is_auth());
        assert!(check_envelope(json!({"errno": 401})).unwrap_err().is_auth());
    }

    #[test]
    fn envelope_malformed_is_api_error() {
        for payload in [
            json!([1, 2]),
            json!({"msg": "no errno"}),
            json!({"errno": "0"}),
            json!({"errno": true}),
            json!({"errno": 0.5}),
        ] {
            let err = check_envelope(payload).unwrap_err();
            assert!(matches!(err, FoxessError::Api { code: None, .. }));
        }
    }

    #[test]
    fn parse_result_names_field_path() {
        let err = parse_result::<InverterDetail>(json!({"capacity": 5.0}), "device detail")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("device detail"));
        assert!(msg.contains("deviceSN"));
    }

    #[tokio::test]
    async fn detail_request_is_signed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/op/v1/device/detail")
            .match_query(Matcher::UrlEncoded("sn".into(), "SN1".into()))
            .match_header("token", "test-key")
            .match_header("signature", Matcher::Regex("^[0-9a-f]{32}$".into()))
            .match_header("timestamp", Matcher::Regex("^[0-9]{13}$".into()))
            .match_header("lang", "en")
            .match_header("timezone", "Europe/London")
            .with_status(200)
            .with_body(r#"{"errno":0,"result":{"deviceSN":"SN1","capacity":5.0}}"#)
            .create_async()
            .await;

        let detail = client_for(&server).get_device_detail("SN1").await.unwrap();
        assert_eq!(detail.device_sn, "SN1");
        assert_eq!(detail.capacity, Some(5.0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn report_omits_unset_month_and_day() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/op/v0/device/report/query")
            .match_body(Matcher::Json(json!({
                "sn": "SN1",
                "dimension": "year",
                "year": 2025,
                "variables": DEFAULT_REPORT_VARIABLES,
            })))
            .with_status(200)
            .with_body(r#"{"errno":0,"result":[{"variable":"generation","unit":"kWh","values":[1.5,2.0]}]}"#)
            .create_async()
            .await;

        let query = ReportQuery::new("SN1", ReportDimension::Year, 2025);
        let points = client_for(&server)
            .get_production_report(&query)
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].values, vec![1.5, 2.0]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn setting_write_accepts_null_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/op/v0/device/setting/set")
            .match_body(Matcher::Json(json!({"sn": "SN1", "key": "MinSocOnGrid", "value": 15})))
            .with_status(200)
            .with_body(r#"{"errno":0,"result":null}"#)
            .create_async()
            .await;

        let result = client_for(&server)
            .set_setting("SN1", "min_soc_on_grid", 15_i64)
            .await
            .unwrap();
        assert_eq!(result, SettingWriteResult::default());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/op/v0/device/generation")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("GET", "/op/v0/device/battery/soc/get")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(client.get_generation("SN1").await.unwrap_err().is_auth());
        assert!(client.get_battery_soc("SN1").await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn non_json_body_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/op/v1/device/scheduler/get")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client_for(&server).get_scheduler("SN1").await.unwrap_err();
        assert!(matches!(err, FoxessError::Api { code: None, .. }));
    }

    #[tokio::test]
    async fn tracker_counts_every_request() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/op/v0/device/list")
            .with_status(200)
            .with_body(r#"{"errno":0,"result":{"data":[]}}"#)
            .expect(2)
            .create_async()
            .await;

        let tracker = Arc::new(ApiCallTracker::new());
        let client = client_for(&server).with_call_tracker(tracker.clone());
        client.list_inverters(1, 10).await.unwrap();
        client.list_inverters(2, 10).await.unwrap();
        assert_eq!(tracker.count_last_24h(), 2);
    }
}
