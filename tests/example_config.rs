//! The shipped example configuration must stay loadable.

use std::path::Path;

use pricecatcher_mcp::config::{load_config, ProviderKind};

#[test]
fn test_example_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/example-config.json");
    let config = load_config(Some(&path)).unwrap();

    assert_eq!(config.provider.kind, ProviderKind::Sample);
    assert_eq!(config.http.bind.port(), 8080);
    assert_eq!(config.logging.level, "warn");
}
