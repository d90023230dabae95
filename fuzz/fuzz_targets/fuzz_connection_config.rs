#![no_main]

use amqp_resolver::ConnectionConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    // Arbitrary input must either extract or fail with an error, never panic.
    if let Ok(config) = ConnectionConfig::from_value(&value) {
        assert!(config.port() != 0);
        let _ = config.endpoint();
        let _ = format!("{:?}", config);
    }

    // Same input nested below a connection name
    let nested = serde_json::json!({ "options": value.clone(), "ssl_options": value });
    let _ = ConnectionConfig::from_value(&nested);
});
