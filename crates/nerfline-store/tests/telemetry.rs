//! Subscriber installation runs in its own test binary since it sets the
//! process-wide default.

use nerfline_store::Config;
use nerfline_store::telemetry;

#[test]
fn init_installs_once() {
    let cfg = Config::from_lookup(|key| match key {
        "NERFLINE_LOG" => Some("nerfline_store=debug".to_owned()),
        "NERFLINE_LOG_JSON" => Some("true".to_owned()),
        _ => None,
    });
    assert!(cfg.log_json);

    telemetry::init(&cfg).unwrap();
    tracing::info!(component = "telemetry-test", "subscriber installed");
    assert!(telemetry::init(&cfg).is_err());
}
