use std::sync::Arc;
use std::time::Duration;

use roomcast::bus::ws_bus::WsBus;
use roomcast::config::load_config;
use roomcast::gateway::Gateway;
use roomcast::mux::Multiplexer;
use roomcast::store::StateStore;
use roomcast::store::sled_store::SledStore;
use roomcast::transport::websocket::start_websocket_server;
use roomcast::utils::backoff::RetryPolicy;
use roomcast::utils::logging;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = load_config().expect("Failed to load configuration");
    logging::init(&config.log.level);

    let retry = config.relay.retry_policy();

    let store: Arc<dyn StateStore> =
        Arc::new(SledStore::open(&config.store.path).expect("Failed to open state store"));
    // Membership counts are rebuilt from live connections; state left behind
    // by a previous process must not survive a restart.
    store.clear().await.expect("Failed to reset state store");

    let bus_retry = RetryPolicy {
        op_timeout: Duration::from_millis(config.bus.connect_timeout_ms),
        ..retry.clone()
    };
    let (bus, inbound) = WsBus::connect(config.bus.url.clone(), bus_retry);

    let mux = Arc::new(Multiplexer::new(Arc::new(bus), store.clone(), retry.clone()));
    let gateway = Arc::new(Gateway::new(store, mux.clone(), retry));

    tokio::spawn(Multiplexer::run_delivery(gateway.clone(), inbound));
    tokio::spawn(Multiplexer::start_reconcile_loop(
        mux,
        gateway.clone(),
        Duration::from_secs(config.relay.reconcile_interval_secs),
    ));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    start_websocket_server(&addr, gateway)
        .await
        .expect("WebSocket server failed");
}
