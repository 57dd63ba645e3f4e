/// Config file loading and default generation.
use slipxfer::config::{Config, SinkKind};

#[tokio::test]
async fn load_reads_partial_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[serial]
port = "/dev/ttyS3"
baud_rate = 57600

[transfer]
sink = "memory"
sink_capacity = 2048

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = Config::load(path.to_str().unwrap()).await.unwrap();
    assert_eq!(config.serial.port, "/dev/ttyS3");
    assert_eq!(config.serial.baud_rate, 57600);
    assert_eq!(config.transfer.sink, SinkKind::Memory);
    assert_eq!(config.transfer.sink_capacity, 2048);
    assert_eq!(config.logging.level_filter(), log::LevelFilter::Debug);
    assert_eq!(config.sender.max_retries, 3);
}

#[tokio::test]
async fn load_rejects_invalid_values() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[transfer]\nsink_capacity = 0\n").unwrap();
    let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
    assert!(err.to_string().contains("sink_capacity"));
}

#[tokio::test]
async fn load_reports_missing_file() {
    let err = Config::load("/nonexistent/slipxfer.toml").await.unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[tokio::test]
async fn create_default_writes_loadable_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    let path = path.to_str().unwrap();
    Config::create_default(path).await.unwrap();
    let config = Config::load(path).await.unwrap();
    assert_eq!(config.transfer.sink, SinkKind::File);
    assert_eq!(config.transfer.max_frame, 10 * 1024);
}
