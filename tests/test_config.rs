use hearth::config::Config;
use std::time::Duration;

#[test]
fn test_default_values() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.server.max_connections, 65535);
    assert_eq!(cfg.static_files.root.to_str().unwrap(), "public");
    assert_eq!(cfg.pool.workers, 4);
    assert_eq!(cfg.pool.queue_depth, 10000);
    assert_eq!(cfg.timeouts.tick_secs, 5);
}

#[test]
fn test_idle_deadline_is_three_ticks() {
    let cfg = Config::default();
    assert_eq!(cfg.timeouts.tick(), Duration::from_secs(5));
    assert_eq!(cfg.timeouts.idle(), Duration::from_secs(15));
}

#[test]
fn test_full_yaml_config() {
    let yaml = r#"
server:
  listen_addr: "0.0.0.0:9000"
  max_connections: 128
static_files:
  root: "/srv/www"
pool:
  workers: 8
  queue_depth: 500
timeouts:
  tick_secs: 2
"#;
    let cfg = Config::from_yaml(yaml).unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:9000");
    assert_eq!(cfg.server.max_connections, 128);
    assert_eq!(cfg.static_files.root.to_str().unwrap(), "/srv/www");
    assert_eq!(cfg.pool.workers, 8);
    assert_eq!(cfg.pool.queue_depth, 500);
    assert_eq!(cfg.timeouts.idle(), Duration::from_secs(6));
}

#[test]
fn test_partial_yaml_keeps_defaults_elsewhere() {
    let yaml = r#"
static_files:
  root: "htdocs"
"#;
    let cfg = Config::from_yaml(yaml).unwrap();
    assert_eq!(cfg.static_files.root.to_str().unwrap(), "htdocs");
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.pool.workers, 4);
}

#[test]
fn test_malformed_yaml_is_an_error() {
    assert!(Config::from_yaml("server: [not a map").is_err());
}

#[test]
fn test_listen_env_override() {
    unsafe {
        std::env::remove_var("HEARTH_CONFIG");
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    unsafe {
        std::env::remove_var("LISTEN");
    }
}
