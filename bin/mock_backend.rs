// Coco Onboard - Mock Backend
// Serves the registration contracts over fixture data for local development

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug, Clone)]
#[command(name = "coco-mock-backend")]
#[command(about = "Fixture backend for the onboarding client")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Registration fee; 0 disables the fee
    #[arg(long, env = "MOCK_FEE", default_value = "50")]
    fee: f64,

    /// Delay added to every list lookup, to watch loading states
    #[arg(long, env = "MOCK_LATENCY_MS", default_value = "0")]
    latency_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    fee: f64,
    latency: Duration,
    geo: Arc<GeoFixture>,
    registry: Arc<Mutex<Registry>>,
}

/// Envelope every endpoint answers with
#[derive(Serialize)]
struct ApiResponse<T> {
    status: u8,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            status: 1,
            data,
            message: None,
        }
    }
}

fn rejected(code: StatusCode, message: impl Into<String>) -> axum::response::Response {
    let body = ApiResponse {
        status: 0,
        data: Value::Null,
        message: Some(message.into()),
    };
    (code, Json(body)).into_response()
}

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct Place {
    id: u32,
    name: &'static str,
    name_local: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pincode: Option<&'static str>,
}

const fn place(id: u32, name: &'static str, name_local: &'static str) -> Place {
    Place { id, name, name_local, pincode: None }
}

const fn village(id: u32, name: &'static str, name_local: &'static str, pincode: &'static str) -> Place {
    Place { id, name, name_local, pincode: Some(pincode) }
}

/// Reverse geocoding answers for fixes near a district headquarters
struct Anchor {
    latitude: f64,
    longitude: f64,
    postal_code: &'static str,
    region: &'static str,
    subregion: &'static str,
}

static ANCHORS: [Anchor; 3] = [
    Anchor { latitude: 10.52, longitude: 76.21, postal_code: "680001", region: "Kerala", subregion: "Thrissur" },
    Anchor { latitude: 11.25, longitude: 75.78, postal_code: "673001", region: "Kerala", subregion: "Kozhikode" },
    Anchor { latitude: 13.34, longitude: 77.10, postal_code: "572101", region: "Karnataka", subregion: "Tumakuru" },
];

/// Children of each node, keyed by (plural list name, parent id)
struct GeoFixture {
    lists: HashMap<(&'static str, u32), Vec<Place>>,
    states: Vec<Place>,
}

impl GeoFixture {
    fn new() -> Self {
        let mut lists = HashMap::new();
        lists.insert(
            ("districts", 32),
            vec![place(3201, "Thrissur", "തൃശ്ശൂർ"), place(3202, "Kozhikode", "കോഴിക്കോട്")],
        );
        lists.insert(("districts", 29), vec![place(2901, "Tumakuru", "ತುಮಕೂರು")]);
        lists.insert(
            ("subdistricts", 3201),
            vec![place(320101, "Chalakudy", "ചാലക്കുടി"), place(320102, "Kodungallur", "കൊടുങ്ങല്ലൂർ")],
        );
        lists.insert(("subdistricts", 3202), vec![place(320201, "Vadakara", "വടകര")]);
        lists.insert(("subdistricts", 2901), vec![place(290101, "Tiptur", "ತಿಪಟೂರು")]);
        lists.insert(
            ("panchayats", 320101),
            vec![place(5001, "Kodakara", "കൊടകര"), place(5002, "Meloor", "മേലൂർ")],
        );
        lists.insert(("panchayats", 320102), vec![place(5003, "Eriyad", "എറിയാട്")]);
        lists.insert(("panchayats", 320201), vec![place(5004, "Onchiyam", "ഒഞ്ചിയം")]);
        lists.insert(("panchayats", 290101), vec![place(5005, "Honnavalli", "ಹೊನ್ನವಳ್ಳಿ")]);
        lists.insert(
            ("villages", 5001),
            vec![
                village(900001, "Kodakara East", "കൊടകര കിഴക്ക്", "680684"),
                village(900002, "Vasupuram", "വാസുപുരം", "680684"),
            ],
        );
        lists.insert(("villages", 5002), vec![village(900003, "Pushpagiri", "പുഷ്പഗിരി", "680311")]);
        lists.insert(("villages", 5003), vec![village(900004, "Azhikode", "അഴീക്കോട്", "680666")]);
        lists.insert(("villages", 5004), vec![village(900005, "Kunnummakkara", "കുന്നുമ്മക്കര", "673308")]);
        lists.insert(("villages", 5005), vec![village(900006, "Bennenahalli", "ಬೆನ್ನೇನಹಳ್ಳಿ", "572201")]);

        GeoFixture {
            lists,
            states: vec![place(32, "Kerala", "കേരളം"), place(29, "Karnataka", "ಕರ್ನಾಟಕ")],
        }
    }

    fn children(&self, list: &'static str, parent: &str) -> Vec<Place> {
        parent
            .parse::<u32>()
            .ok()
            .and_then(|id| self.lists.get(&(list, id)))
            .cloned()
            .unwrap_or_default()
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct Farmer {
    id: u64,
    role_id: u8,
    fields: HashMap<String, String>,
    files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PaymentStatus {
    user_id: String,
    payment_id: String,
    payment_status: u8,
    amount: f64,
    currency: String,
    payment_method: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    farmers: Vec<Farmer>,
    /// Idempotency-Key → farmer id
    submissions: HashMap<String, u64>,
    payments: Vec<PaymentStatus>,
}

impl Registry {
    fn register(&mut self, key: Option<String>, fields: HashMap<String, String>, files: Vec<String>) -> Farmer {
        if let Some(existing) = key
            .as_ref()
            .and_then(|k| self.submissions.get(k))
            .and_then(|id| self.farmers.iter().find(|f| f.id == *id))
        {
            info!(farmer = existing.id, "duplicate submission, returning existing farmer");
            return existing.clone();
        }

        self.next_id += 1;
        let farmer = Farmer {
            id: 100 + self.next_id,
            role_id: 2,
            fields,
            files,
        };
        if let Some(key) = key {
            self.submissions.insert(key, farmer.id);
        }
        self.farmers.push(farmer.clone());
        farmer
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

#[derive(Debug, Deserialize)]
struct ReverseQuery {
    lat: f64,
    lng: f64,
}

/// GET /geocode/reverse?lat=..&lng=.. - nearest fixture district
async fn reverse_geocode(Query(query): Query<ReverseQuery>) -> axum::response::Response {
    let distance = |a: &Anchor| (a.latitude - query.lat).powi(2) + (a.longitude - query.lng).powi(2);
    let Some(anchor) = ANCHORS.iter().min_by(|a, b| distance(*a).total_cmp(&distance(*b))) else {
        return rejected(StatusCode::NOT_FOUND, "no fixture places");
    };

    info!(lat = query.lat, lng = query.lng, region = anchor.region, "reverse geocode");
    Json(ApiResponse::ok(json!({
        "place": {
            "postal_code": anchor.postal_code,
            "region": anchor.region,
            "subregion": anchor.subregion,
        }
    })))
    .into_response()
}

async fn list_response(state: &AppState, key: &'static str, places: Vec<Place>) -> axum::response::Response {
    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }
    let mut data = serde_json::Map::new();
    data.insert(key.to_string(), json!(places));
    Json(ApiResponse::ok(Value::Object(data))).into_response()
}

/// GET /states/all
async fn get_states(State(state): State<AppState>) -> impl IntoResponse {
    let states = state.geo.states.clone();
    list_response(&state, "states", states).await
}

/// GET /districts/state/:id/all
async fn get_districts(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let places = state.geo.children("districts", &id);
    list_response(&state, "districts", places).await
}

/// GET /subdistricts/district/:id/all
async fn get_subdistricts(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let places = state.geo.children("subdistricts", &id);
    list_response(&state, "subdistricts", places).await
}

/// GET /panchayats/subdistrict/:id/all
async fn get_panchayats(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let places = state.geo.children("panchayats", &id);
    list_response(&state, "panchayats", places).await
}

/// GET /villages/panchayat/:id
async fn get_villages(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let places = state.geo.children("villages", &id);
    list_response(&state, "villages", places).await
}

/// GET /fees
async fn get_fees(State(state): State<AppState>) -> impl IntoResponse {
    let enabled = if state.fee > 0.0 { 1 } else { 0 };
    Json(ApiResponse::ok(json!({
        "fees": [{ "reg_fees_enable": enabled, "reg_fees": format!("{:.2}", state.fee) }]
    })))
}

/// POST /users/register-farmer - multipart form with photos
async fn register_farmer(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> axum::response::Response {
    let mut fields = HashMap::new();
    let mut files = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return rejected(StatusCode::BAD_REQUEST, format!("bad multipart body: {}", e)),
        };
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            match field.bytes().await {
                Ok(bytes) => files.push(format!("{}={} ({} bytes)", name, file_name, bytes.len())),
                Err(e) => return rejected(StatusCode::BAD_REQUEST, format!("upload {} failed: {}", name, e)),
            }
        } else {
            match field.text().await {
                Ok(text) => {
                    fields.insert(name, text);
                }
                Err(e) => return rejected(StatusCode::BAD_REQUEST, format!("field {} unreadable: {}", name, e)),
            }
        }
    }

    if let Some(mobile) = fields.get("mobile") {
        if mobile.len() != 10 || !mobile.chars().all(|c| c.is_ascii_digit()) {
            return rejected(StatusCode::UNPROCESSABLE_ENTITY, "mobile must be 10 digits");
        }
    }

    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let farmer = state
        .registry
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .register(key, fields, files);
    info!(farmer = farmer.id, files = farmer.files.len(), "farmer registered");

    let mut profile = json!({ "id": farmer.id, "role_id": farmer.role_id });
    if let Some(name) = farmer.fields.get("full_name") {
        profile["name"] = json!(name);
    }

    Json(ApiResponse::ok(json!({
        "farmer": profile,
        "token": format!("mock-token-{}", farmer.id),
    })))
    .into_response()
}

/// POST /payments/update-status
async fn update_payment_status(
    State(state): State<AppState>,
    Json(report): Json<PaymentStatus>,
) -> impl IntoResponse {
    if report.payment_status > 1 {
        warn!(status = report.payment_status, "unexpected payment status");
    }
    info!(
        user = %report.user_id,
        payment = %report.payment_id,
        status = report.payment_status,
        "payment status received"
    );
    state
        .registry
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .payments
        .push(report);
    Json(ApiResponse::ok(json!({})))
}

/// GET /debug/registry - everything received so far
async fn get_registry(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.lock().unwrap_or_else(|p| p.into_inner());
    Json(ApiResponse::ok(json!({
        "farmers": registry.farmers,
        "payments": registry.payments,
    })))
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("coco_mock_backend={},tower_http={},info", log_level, log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("🌴 Coco Onboard - Mock Backend");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let state = AppState {
        fee: args.fee,
        latency: Duration::from_millis(args.latency_ms),
        geo: Arc::new(GeoFixture::new()),
        registry: Arc::new(Mutex::new(Registry::default())),
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/states/all", get(get_states))
        .route("/districts/state/:id/all", get(get_districts))
        .route("/subdistricts/district/:id/all", get(get_subdistricts))
        .route("/panchayats/subdistrict/:id/all", get(get_panchayats))
        .route("/villages/panchayat/:id", get(get_villages))
        .route("/geocode/reverse", get(reverse_geocode))
        .route("/fees", get(get_fees))
        .route("/users/register-farmer", post(register_farmer))
        .route("/payments/update-status", post(update_payment_status))
        .route("/debug/registry", get(get_registry))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    println!("✓ Fee: {}", if args.fee > 0.0 { format!("INR {:.2}", args.fee) } else { "disabled".to_string() });
    println!("✓ List latency: {} ms", args.latency_ms);
    println!("\n🚀 Listening on http://{}", args.listen);

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
