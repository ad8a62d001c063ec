//! Integration test: start the gateway on a free port, query the status endpoints and
//! post webhook deliveries. No messaging gateway is configured, so replies fail and
//! the engine rolls sessions back to their pre-turn state. The server task is aborted at the end.

use std::path::PathBuf;
use std::time::Duration;
use wabot::config::Config;
use wabot::gateway;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_config_dir() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("wabot-gateway-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create config dir");
    std::fs::write(dir.join("directory.json"), r#"{"customers":[],"invoices":[]}"#)
        .expect("write directory.json");
    let config_path = dir.join("config.json");
    std::fs::write(&config_path, b"{}").expect("write config.json");
    (dir, config_path)
}

async fn wait_until_up(client: &reqwest::Client, url: &str) -> serde_json::Value {
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

#[tokio::test]
async fn gateway_serves_status_and_webhook() {
    let port = free_port();
    let (_temp_dir, config_path) = temp_config_dir();

    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, config_path).await;
    });

    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    let banner = wait_until_up(&client, &format!("{}/", base)).await;
    assert_eq!(banner.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(banner.get("name").and_then(|v| v.as_str()), Some("wabot"));
    assert_eq!(banner.get("port").and_then(|v| v.as_u64()), Some(port as u64));

    // Directory file exists; the unconfigured messenger fails its check.
    let resp = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let health: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["checks"]["directory"], "ok");
    assert_eq!(health["activeSessions"], 0);

    let status: serde_json::Value = client
        .get(format!("{}/webhook/status", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["success"], true);

    let now = chrono::Utc::now().timestamp();
    let delivery = serde_json::json!({
        "event": "messages.upsert",
        "data": [
            {
                "key": { "remoteJid": "5531988887777@s.whatsapp.net", "id": "OLD", "fromMe": false },
                "messageTimestamp": now - 3600,
                "message": { "conversation": "oi" }
            },
            {
                "key": { "remoteJid": "5531988887777@s.whatsapp.net", "id": "MINE", "fromMe": true },
                "messageTimestamp": now,
                "message": { "conversation": "oi" }
            },
            {
                "key": { "remoteJid": "5531988887777@s.whatsapp.net", "id": "NEW", "fromMe": false },
                "messageTimestamp": now.to_string(),
                "message": { "extendedTextMessage": { "text": "bom dia" } }
            }
        ]
    });
    let resp = client
        .post(format!("{}/webhook/message", base))
        .json(&delivery)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["total"], 3);
    assert_eq!(body["results"][0]["reason"], "stale");
    assert_eq!(body["results"][1]["reason"], "self-sent");
    assert_eq!(body["results"][2]["messageId"], "NEW");
    assert_eq!(body["results"][2]["status"], "error");

    // The failed first turn leaves the new session in START.
    let sessions: serde_json::Value = client
        .get(format!("{}/sessions", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions[0]["phone"], "5531988887777");
    assert_eq!(sessions[0]["state"], "START");

    let resp = client
        .delete(format!("{}/sessions/5531988887777", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let resp = client
        .post(format!("{}/webhook/message", base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    gateway_handle.abort();
    let _ = std::fs::remove_dir_all(&_temp_dir);
}
