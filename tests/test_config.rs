use std::io::Write;

use switchyard::config::{CONFIG_ENV, Config, LISTEN_ENV};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.read_chunk_size, 4096);
    assert_eq!(cfg.max_header_bytes, 16384);
    assert!(cfg.close_on_protocol_mismatch);
}

#[test]
fn test_config_from_yaml_partial() {
    let cfg = Config::from_yaml("listen_addr: \"0.0.0.0:3000\"\nmax_header_bytes: 8192\n").unwrap();

    assert_eq!(cfg.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.max_header_bytes, 8192);
    assert_eq!(cfg.read_chunk_size, 4096);
    assert!(cfg.close_on_protocol_mismatch);
}

#[test]
fn test_config_from_yaml_full() {
    let yaml = r#"
listen_addr: "[::1]:9000"
read_chunk_size: 512
max_header_bytes: 4096
close_on_protocol_mismatch: false
"#;
    let cfg = Config::from_yaml(yaml).unwrap();

    assert_eq!(cfg.listen_addr, "[::1]:9000");
    assert_eq!(cfg.read_chunk_size, 512);
    assert!(!cfg.close_on_protocol_mismatch);
}

#[test]
fn test_config_rejects_zero_chunk_size() {
    assert!(Config::from_yaml("read_chunk_size: 0\n").is_err());
}

#[test]
fn test_config_rejects_malformed_yaml() {
    assert!(Config::from_yaml("read_chunk_size: [not, a, number]\n").is_err());
}

#[test]
fn test_config_missing_file() {
    let err = Config::from_file("/nonexistent/switchyard.yaml").unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
}

// The only test touching the process environment.
#[test]
fn test_config_load_from_env() {
    let path = std::env::temp_dir().join(format!("switchyard-test-{}.yaml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "listen_addr: \"127.0.0.1:7000\"\nread_chunk_size: 1024").unwrap();
    drop(file);

    unsafe {
        std::env::set_var(CONFIG_ENV, &path);
        std::env::remove_var(LISTEN_ENV);
    }
    let from_file = Config::load().unwrap();
    assert_eq!(from_file.listen_addr, "127.0.0.1:7000");
    assert_eq!(from_file.read_chunk_size, 1024);

    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:5000");
    }
    let overridden = Config::load().unwrap();
    assert_eq!(overridden.listen_addr, "0.0.0.0:5000");
    assert_eq!(overridden.read_chunk_size, 1024);

    unsafe {
        std::env::remove_var(CONFIG_ENV);
        std::env::remove_var(LISTEN_ENV);
    }
    let defaults = Config::load().unwrap();
    assert_eq!(defaults.listen_addr, "127.0.0.1:8080");

    std::fs::remove_file(&path).unwrap();
}
