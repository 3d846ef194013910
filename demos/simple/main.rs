use std::time::Duration;

use gatekit::{FileStore, InitOptions, User};

pub fn main() -> gatekit::Result<()> {
    // Configure env_logger to see gatekit SDK logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("gatekit")).init();

    let api_key = std::env::var("GATEKIT_CLIENT_KEY")
        .expect("GATEKIT_CLIENT_KEY env variable should contain a client API key");
    let client = gatekit::ClientConfig::from_api_key(api_key)
        .app_version(env!("CARGO_PKG_VERSION"))
        .storage(FileStore::new(std::env::temp_dir().join("gatekit-demo")))
        .to_client();

    let user = User::with_user_id("test-user").country("NL");
    let handle = client.initialize(user, InitOptions::default())?;

    // Until the snapshot arrives, gates are off unless a snapshot was cached by a previous run.
    if let Err(err) = handle.wait_timeout(Duration::from_secs(5)) {
        println!("error fetching snapshot: {:?}", err);
    }
    println!("Readiness: {:?}", client.readiness());

    let enabled = client.check_gate("a-boolean-gate");
    println!("Gate: {:?}", enabled);

    let color = client
        .get_config("a-dynamic-config")
        .and_then(|config| config.get_str("color").map(str::to_owned))
        // default value
        .unwrap_or_else(|| "blue".to_owned());
    println!("Config color: {:?}", color);

    client.log_event_with_value("demo_completed", 1.0, None);

    // Deliver buffered exposures and events before exiting.
    client.shutdown()
}
