// 🌐 Backend API - REST contracts for geography, fees, registration, payments
//
// Every response is wrapped as `{status, data}`. `HttpBackend` implements both
// the geo resolver and the registration backend over one reqwest client.

use crate::error::{Result, WizardError};
use crate::form::FieldMap;
use crate::geo::{GeoHierarchyResolver, GeoLevel, GeoOption};
use crate::location::{Coordinates, DeviceLocation, GeocodedPlace};
use crate::payment::PaymentStatusReport;
use async_trait::async_trait;
use reqwest::{header, multipart, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// e.g. "https://api.example.org/v1"
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// CONTRACT TYPES
// ============================================================================

/// Registration fee settings from `GET /fees`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub fees_enabled: bool,
    pub amount: f64,
}

impl FeeConfig {
    pub fn disabled() -> Self {
        FeeConfig {
            fees_enabled: false,
            amount: 0.0,
        }
    }

    pub fn is_due(&self) -> bool {
        self.fees_enabled && self.amount > 0.0
    }
}

/// What `POST /users/register-farmer` hands back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub farmer_id: String,
    pub role_id: i64,
    pub token: String,
    /// The `farmer` object as returned, cached as the local profile
    pub profile: Value,
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_fees(&self) -> Result<FeeConfig>;

    /// One multipart submission of every captured field and media file
    async fn register_farmer(&self, fields: &FieldMap) -> Result<RegistrationResponse>;

    async fn update_payment_status(&self, report: &PaymentStatusReport) -> Result<()>;

    /// Use this bearer token for later calls
    fn authorize(&self, _token: &str) {}
}

// ============================================================================
// ENVELOPE PARSING
// ============================================================================

/// `status` has been seen as a bool, a number and a string
fn status_ok(status: &Value) -> bool {
    match status {
        Value::Bool(b) => *b,
        Value::Number(n) => matches!(n.as_i64(), Some(1) | Some(200) | Some(201)),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "success" | "ok" | "true" | "1"),
        _ => false,
    }
}

/// Unwrap `{status, data}` into `data`
pub fn unwrap_envelope(body: Value) -> Result<Value> {
    let status = body.get("status").cloned().unwrap_or(Value::Null);
    if !status_ok(&status) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request rejected")
            .to_string();
        return Err(WizardError::Server { status: 200, message });
    }

    body.get("data")
        .cloned()
        .ok_or_else(|| WizardError::InvalidResponse("envelope has no data".into()))
}

fn as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn first_str<'a>(value: &'a Value, keys: &[String]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(k.as_str()).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Backend record → option; label keys vary per level
pub fn parse_option(level: GeoLevel, value: &Value) -> Option<GeoOption> {
    let id = value.get("id").and_then(as_id)?;
    let prefix = level.as_str();

    let name_keys = ["name".to_string(), format!("{}_name", prefix), "title".to_string()];
    let local_keys = [
        "name_local".to_string(),
        "local_name".to_string(),
        format!("{}_name_local", prefix),
    ];

    let name = first_str(value, &name_keys)?.to_string();
    let name_local = first_str(value, &local_keys).map(str::to_string);

    Some(GeoOption {
        id,
        name,
        name_local,
        raw: Some(value.clone()),
    })
}

/// `data.<plural>` → options, skipping malformed records
pub fn parse_options(level: GeoLevel, data: &Value) -> Result<Vec<GeoOption>> {
    let key = list_key(level);
    let list = data
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| WizardError::InvalidResponse(format!("missing data.{}", key)))?;

    Ok(list.iter().filter_map(|v| parse_option(level, v)).collect())
}

pub fn parse_fees(data: &Value) -> Result<FeeConfig> {
    let fee = data
        .get("fees")
        .and_then(Value::as_array)
        .and_then(|fees| fees.first())
        .ok_or_else(|| WizardError::InvalidResponse("missing data.fees[0]".into()))?;

    let enabled = fee.get("reg_fees_enable").and_then(as_number).unwrap_or(0.0);
    let amount = fee.get("reg_fees").and_then(as_number).unwrap_or(0.0);
    if !amount.is_finite() || amount < 0.0 {
        return Err(WizardError::InvalidResponse(format!("unusable reg_fees {}", amount)));
    }

    Ok(FeeConfig {
        fees_enabled: enabled != 0.0,
        amount,
    })
}

/// `data.place` from the reverse geocoder; every part is optional
pub fn parse_place(data: &Value) -> Result<GeocodedPlace> {
    let place = data
        .get("place")
        .ok_or_else(|| WizardError::InvalidResponse("missing data.place".into()))?;
    let text = |key: &str| {
        place
            .get(key)
            .and_then(as_id)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    Ok(GeocodedPlace {
        postal_code: text("postal_code"),
        region: text("region"),
        subregion: text("subregion"),
    })
}

pub fn parse_registration(data: &Value) -> Result<RegistrationResponse> {
    let farmer = data
        .get("farmer")
        .ok_or_else(|| WizardError::InvalidResponse("missing data.farmer".into()))?;

    let farmer_id = farmer
        .get("id")
        .and_then(as_id)
        .ok_or_else(|| WizardError::InvalidResponse("missing farmer.id".into()))?;
    let role_id = farmer.get("role_id").and_then(as_number).unwrap_or(0.0) as i64;
    let token = data
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| WizardError::InvalidResponse("missing data.token".into()))?
        .to_string();

    Ok(RegistrationResponse {
        farmer_id,
        role_id,
        token,
        profile: farmer.clone(),
    })
}

fn list_key(level: GeoLevel) -> &'static str {
    match level {
        GeoLevel::State => "states",
        GeoLevel::District => "districts",
        GeoLevel::Subdistrict => "subdistricts",
        GeoLevel::Panchayat => "panchayats",
        GeoLevel::Village => "villages",
    }
}

/// Path for one level's option list
pub fn geo_path(level: GeoLevel, parent_id: Option<&str>) -> Result<String> {
    let parent = || {
        parent_id
            .filter(|p| !p.is_empty())
            .map(|p| urlencoding::encode(p).into_owned())
            .ok_or_else(|| WizardError::Validation(format!("{} needs a parent id", level)))
    };

    Ok(match level {
        GeoLevel::State => "/states/all".to_string(),
        GeoLevel::District => format!("/districts/state/{}/all", parent()?),
        GeoLevel::Subdistrict => format!("/subdistricts/district/{}/all", parent()?),
        GeoLevel::Panchayat => format!("/panchayats/subdistrict/{}/all", parent()?),
        GeoLevel::Village => format!("/villages/panchayat/{}", parent()?),
    })
}

/// Stable digest of the text fields, sent as an idempotency key
pub fn submission_fingerprint(fields: &FieldMap) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in fields.iter() {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        match value.as_text() {
            Some(text) => hasher.update(text.as_bytes()),
            None => {
                if let crate::form::FieldValue::Media(handle) = value {
                    hasher.update(handle.path.to_string_lossy().as_bytes());
                }
            }
        }
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

pub struct HttpBackend {
    config: ClientConfig,
    client: Client,
    token: RwLock<Option<String>>,
    cancel: Notify,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            client,
            token: RwLock::new(None),
            cancel: Notify::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let token = self
            .token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WizardError::Server {
                status: status.as_u16(),
                message,
            });
        }
        let body: Value = response.json().await?;
        unwrap_envelope(body)
    }

    async fn get_data(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self.with_auth(self.client.get(&url)).send().await?;
        self.handle_response(response).await
    }

    async fn build_registration_form(fields: &FieldMap) -> Result<multipart::Form> {
        let mut form = multipart::Form::new();

        for (key, value) in fields.iter() {
            if let Some(text) = value.as_text() {
                form = form.text(key.clone(), text);
            }
        }

        for (key, handle) in fields.media() {
            let bytes = tokio::fs::read(&handle.path)
                .await
                .map_err(|e| WizardError::Validation(format!("cannot read {}: {}", handle.path.display(), e)))?;
            let part = multipart::Part::bytes(bytes)
                .file_name(handle.file_name())
                .mime_str(&handle.mime)?;
            form = form.part(key.clone(), part);
        }

        Ok(form)
    }
}

impl HttpBackend {
    pub async fn reverse_geocode(&self, coords: Coordinates) -> Result<GeocodedPlace> {
        let path = format!("/geocode/reverse?lat={}&lng={}", coords.latitude, coords.longitude);
        let data = self.get_data(&path).await?;
        parse_place(&data)
    }
}

/// Device location for terminals: a configured fix, named by the backend geocoder
pub struct BackendLocation {
    backend: Arc<HttpBackend>,
    position: Option<Coordinates>,
}

impl BackendLocation {
    pub fn new(backend: Arc<HttpBackend>, position: Option<Coordinates>) -> Self {
        Self { backend, position }
    }
}

#[async_trait]
impl DeviceLocation for BackendLocation {
    async fn current_position(&self) -> Result<Coordinates> {
        self.position
            .ok_or_else(|| WizardError::Validation("no position configured".into()))
    }

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<GeocodedPlace> {
        self.backend.reverse_geocode(coords).await
    }
}

#[async_trait]
impl GeoHierarchyResolver for HttpBackend {
    async fn resolve(&self, level: GeoLevel, parent_id: Option<&str>) -> Result<Vec<GeoOption>> {
        let path = geo_path(level, parent_id)?;

        let fetch = async {
            let data = self.get_data(&path).await?;
            parse_options(level, &data)
        };

        tokio::select! {
            result = fetch => result,
            _ = self.cancel.notified() => Err(WizardError::Cancelled),
        }
    }

    fn cancel_pending(&self) {
        self.cancel.notify_waiters();
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_fees(&self) -> Result<FeeConfig> {
        let data = self.get_data("/fees").await?;
        parse_fees(&data)
    }

    async fn register_farmer(&self, fields: &FieldMap) -> Result<RegistrationResponse> {
        let form = Self::build_registration_form(fields).await?;
        let url = self.url("/users/register-farmer");
        debug!(%url, fields = fields.len(), "POST registration");

        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", submission_fingerprint(fields))
            .multipart(form)
            .send()
            .await?;
        let data = self.handle_response(response).await?;
        parse_registration(&data)
    }

    async fn update_payment_status(&self, report: &PaymentStatusReport) -> Result<()> {
        let url = self.url("/payments/update-status");
        let response = self
            .with_auth(self.client.post(&url))
            .header(header::CONTENT_TYPE, "application/json")
            .json(report)
            .send()
            .await?;
        self.handle_response(response).await?;
        Ok(())
    }

    fn authorize(&self, token: &str) {
        *self.token.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geo_paths() {
        assert_eq!(geo_path(GeoLevel::State, None).unwrap(), "/states/all");
        assert_eq!(
            geo_path(GeoLevel::District, Some("32")).unwrap(),
            "/districts/state/32/all"
        );
        assert_eq!(
            geo_path(GeoLevel::Village, Some("p 1")).unwrap(),
            "/villages/panchayat/p%201"
        );
        assert!(geo_path(GeoLevel::Panchayat, None).is_err());
    }

    #[test]
    fn test_envelope_status_variants() {
        assert!(unwrap_envelope(json!({"status": true, "data": {}})).is_ok());
        assert!(unwrap_envelope(json!({"status": 200, "data": {}})).is_ok());
        assert!(unwrap_envelope(json!({"status": "success", "data": {}})).is_ok());

        let err = unwrap_envelope(json!({"status": false, "message": "mobile already registered"}));
        assert!(matches!(err, Err(WizardError::Server { message, .. }) if message.contains("mobile")));

        assert!(matches!(
            unwrap_envelope(json!({"status": true})),
            Err(WizardError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_options_mixed_ids_and_labels() {
        let data = json!({"districts": [
            {"id": 7, "district_name": "Thrissur", "name_local": "തൃശ്ശൂർ"},
            {"id": "8", "name": "Palakkad"},
            {"name": "no id"}
        ]});

        let options = parse_options(GeoLevel::District, &data).unwrap();

        assert_eq!(options.len(), 2);
        assert_eq!(options[0].id, "7");
        assert_eq!(options[0].name, "Thrissur");
        assert_eq!(options[0].name_local.as_deref(), Some("തൃശ്ശൂർ"));
        assert_eq!(options[1].id, "8");
        assert!(parse_options(GeoLevel::Village, &data).is_err());
    }

    #[test]
    fn test_parse_fees() {
        let on = parse_fees(&json!({"fees": [{"reg_fees_enable": 1, "reg_fees": "50"}]})).unwrap();
        assert!(on.is_due());
        assert_eq!(on.amount, 50.0);

        let off = parse_fees(&json!({"fees": [{"reg_fees_enable": 0, "reg_fees": 50}]})).unwrap();
        assert!(!off.is_due());

        let zero = parse_fees(&json!({"fees": [{"reg_fees_enable": true, "reg_fees": 0}]})).unwrap();
        assert!(!zero.is_due());

        assert!(parse_fees(&json!({"fees": []})).is_err());
    }

    #[test]
    fn test_parse_fees_rejects_unusable_amounts() {
        for amount in ["inf", "-inf", "NaN", "-5"] {
            let data = json!({"fees": [{"reg_fees_enable": 1, "reg_fees": amount}]});
            assert!(
                matches!(parse_fees(&data), Err(WizardError::InvalidResponse(_))),
                "{} accepted",
                amount
            );
        }
    }

    #[test]
    fn test_parse_place_tolerates_missing_parts() {
        let place = parse_place(&json!({"place": {"postal_code": 680001, "region": "Kerala", "subregion": " "}})).unwrap();
        assert_eq!(place.postal_code.as_deref(), Some("680001"));
        assert_eq!(place.region.as_deref(), Some("Kerala"));
        assert!(place.subregion.is_none());

        assert!(parse_place(&json!({})).is_err());
    }

    #[tokio::test]
    async fn test_backend_location_without_fix() {
        let backend = Arc::new(HttpBackend::new(ClientConfig::default()).unwrap());
        let location = BackendLocation::new(backend, None);
        assert!(matches!(location.current_position().await, Err(WizardError::Validation(_))));
    }

    #[test]
    fn test_parse_registration() {
        let data = json!({"farmer": {"id": 101, "role_id": 2, "name": "Anil"}, "token": "jwt"});
        let reg = parse_registration(&data).unwrap();

        assert_eq!(reg.farmer_id, "101");
        assert_eq!(reg.role_id, 2);
        assert_eq!(reg.token, "jwt");
        assert_eq!(reg.profile["name"], "Anil");

        assert!(parse_registration(&json!({"farmer": {"id": 1}})).is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_sensitive() {
        let mut a = FieldMap::new();
        a.set_text("name", "Anil");
        a.set_text("mobile", "9847012345");
        let mut b = FieldMap::new();
        b.set_text("mobile", "9847012345");
        b.set_text("name", "Anil");

        assert_eq!(submission_fingerprint(&a), submission_fingerprint(&b));
        assert_eq!(submission_fingerprint(&a).len(), 64);

        b.set_text("name", "Anitha");
        assert_ne!(submission_fingerprint(&a), submission_fingerprint(&b));
    }
}
