//! End-to-end smoke test for custodia-node.
//!
//! Starts a real node process against a fresh data directory, drives its
//! JSON-RPC `custodia_execute` endpoint over HTTP, and asserts the
//! auth/role/routing policy and a couple of registered operations behave
//! as wired.
//!
//! Run with:
//!   cargo test -p custodia-node --test smoke

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use custodia_core::types::{TenantId, UserId};
use custodia_crypto::{sign_access_token, AccessTokenClaims};

// ── Node lifecycle ───────────────────────────────────────────────────────────

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

// ── RPC helpers ───────────────────────────────────────────────────────────────

async fn execute(
    client: &reqwest::Client,
    url: &str,
    token: Option<&str>,
    operation: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "custodia_execute",
        "params": [token, operation, params],
        "id": 1,
    });
    let resp = client.post(url).json(&body).send().await.unwrap_or_else(|e| panic!("RPC call {operation} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC transport error calling {operation}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "method": "custodia_execute",
        "params": [null, "wallet.getBalance", {}],
        "id": 1,
    });
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    false
}

fn token_for(user_id: UserId, tenant_id: TenantId, roles: Vec<String>, secret: &[u8]) -> String {
    let claims = AccessTokenClaims::new(&user_id.to_string(), &tenant_id.to_string(), roles, serde_json::json!([]), 0, 3600);
    sign_access_token(secret, &claims).unwrap()
}

// ── Smoke test ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn smoke_gateway_routes_and_enforces_policy() {
    let data_dir = std::env::temp_dir().join(format!("custodia_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&data_dir);
    std::fs::create_dir_all(&data_dir).unwrap();

    let rpc_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");
    let secret = "smoke-test-secret";

    let node_bin = env!("CARGO_BIN_EXE_custodia-node");
    let child = Command::new(node_bin)
        .args(["--data-dir", data_dir.join("state").to_str().unwrap(), "--rpc-addr", &format!("127.0.0.1:{rpc_port}"), "--token-secret", secret])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn custodia-node");

    let _guard = NodeGuard { child, data_dir };

    let http = reqwest::Client::new();
    assert!(wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await, "custodia-node did not become ready within 20 seconds");

    // Unknown operation.
    let result = execute(&http, &rpc_url, None, "not.a.real.operation", serde_json::json!({})).await;
    assert_eq!(result["success"], serde_json::json!(false));

    // Auth-required operation without a token.
    let result = execute(&http, &rpc_url, None, "wallet.getBalance", serde_json::json!({})).await;
    assert_eq!(result["success"], serde_json::json!(false));

    // Role-restricted operation (bonus.award) with a non-admin token.
    let tenant_id = TenantId::new();
    let user_id = UserId::new();
    let user_token = token_for(user_id, tenant_id, vec!["user".to_string()], secret.as_bytes());
    let result = execute(&http, &rpc_url, Some(&user_token), "bonus.award", serde_json::json!({"code": "welcome", "userId": user_id.to_string()})).await;
    assert_eq!(result["success"], serde_json::json!(false), "non-admin caller should be rejected before reaching the bonus engine");

    // A plain transfer between two freshly-minted users has no funds yet, so
    // the ledger rejects the debit leg — but the request should round-trip
    // through auth, rate limiting, and config resolution without error.
    let sender = UserId::new();
    let recipient = UserId::new();
    let result = execute(
        &http,
        &rpc_url,
        Some(&user_token),
        "wallet.createTransfer",
        serde_json::json!({
            "fromUserId": sender.to_string(),
            "toUserId": recipient.to_string(),
            "amount": 500,
            "currency": "usd",
            "feeAmount": null,
            "fromBalanceType": "real",
            "toBalanceType": "real",
            "externalRef": null,
        }),
    )
    .await;
    assert_eq!(result["success"], serde_json::json!(true), "the RPC call itself should succeed: {result:?}");
    assert_eq!(result["data"]["status"], serde_json::json!("failed"), "an unfunded sender's transfer should fail at the ledger, not the gateway");
}
