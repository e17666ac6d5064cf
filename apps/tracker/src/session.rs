use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use motion_ingest_core::{channel, SensorRx, SensorSource};
use trip_engine::ConnectivityHandle;

/// Spawns `src` on the runtime and hands back the receiving end.
pub fn run_source<S: SensorSource + 'static>(src: S) -> (SensorRx, JoinHandle<()>) {
    let (tx, rx) = channel();
    let handle = tokio::spawn(async move {
        if let Err(e) = src.run(tx).await {
            warn!("sensor source stopped: {e}");
        }
    });
    (rx, handle)
}

/// `host:port` of an http(s) endpoint, for the reachability probe.
pub fn probe_target(endpoint: &str) -> Option<String> {
    let url = reqwest::Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{host}:{port}"))
}

pub async fn is_reachable(target: &str, timeout: Duration) -> bool {
    matches!(tokio::time::timeout(timeout, TcpStream::connect(target)).await, Ok(Ok(_)))
}

/// Probes `target` every `period` and reports edges to `conn`.
pub fn spawn_connectivity_probe(conn: ConnectivityHandle, target: String, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let online = is_reachable(&target, period.min(Duration::from_secs(5))).await;
            if conn.set_online(online) {
                info!(%target, online, "connectivity changed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_target_uses_scheme_default_port() {
        assert_eq!(probe_target("https://fleet.example/api/trips").as_deref(), Some("fleet.example:443"));
        assert_eq!(probe_target("http://10.0.0.5:8080/trips").as_deref(), Some("10.0.0.5:8080"));
        assert_eq!(probe_target("not a url"), None);
    }

    #[tokio::test]
    async fn test_probe_sees_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(is_reachable(&addr, Duration::from_secs(1)).await);
        drop(listener);
    }
}
