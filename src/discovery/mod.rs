//! LAN discovery
//!
//! Hosts advertise the control endpoint as a DNS-SD service; clients browse
//! for it during `scan_devices`. The [`Discovery`] trait keeps the
//! dispatcher independent of the mDNS backend.

mod mdns;

pub use mdns::MdnsDiscovery;

use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::DiscoveryError;
use crate::network::local_ipv4;

/// One resolved service instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    /// Instance name, without the service type suffix
    pub display_name: String,
    /// `host:port` a client can dial
    pub address: String,
    pub service_type: String,
}

/// What a host publishes about itself
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub instance_name: String,
    pub service_type: String,
    pub port: u16,
    /// Value of the `path` TXT record
    pub path_hint: String,
}

/// Records produced by a browse, in arrival order.
/// Ends when the browse timeout elapses.
pub struct BrowseResults {
    rx: mpsc::Receiver<DiscoveryRecord>,
}

impl BrowseResults {
    pub fn new(rx: mpsc::Receiver<DiscoveryRecord>) -> Self {
        Self { rx }
    }

    /// Results that are already known, used by static backends
    pub fn from_records(records: Vec<DiscoveryRecord>) -> Self {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            let _ = tx.try_send(record);
        }
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<DiscoveryRecord> {
        self.rx.recv().await
    }
}

/// Service advertisement and browsing
pub trait Discovery: Send + Sync {
    /// Publish this node. Stays registered until the backend is dropped.
    fn advertise(&self, ad: &Advertisement) -> Result<(), DiscoveryError>;

    /// Browse for `service_type` for at most `timeout`
    fn browse(
        &self,
        service_type: &str,
        timeout: Duration,
    ) -> Result<BrowseResults, DiscoveryError>;
}

/// Backend used when discovery is disabled: advertises nothing, finds nothing
#[derive(Debug, Default)]
pub struct NoDiscovery;

impl Discovery for NoDiscovery {
    fn advertise(&self, ad: &Advertisement) -> Result<(), DiscoveryError> {
        tracing::debug!("Discovery disabled, not advertising {}", ad.instance_name);
        Ok(())
    }

    fn browse(
        &self,
        _service_type: &str,
        _timeout: Duration,
    ) -> Result<BrowseResults, DiscoveryError> {
        Ok(BrowseResults::from_records(Vec::new()))
    }
}

/// `<hostname>-<ip>`, the default instance name
pub fn default_instance_name() -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    format!("{}-{}", short_host_name(&host), local_ipv4())
}

/// First label of a host name; `lan-audio` when there is none
fn short_host_name(host: &str) -> &str {
    match host.trim().split('.').next() {
        Some(label) if !label.is_empty() => label,
        _ => "lan-audio",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_results_drain() {
        let record = DiscoveryRecord {
            display_name: "desk".into(),
            address: "10.0.0.7:9090".into(),
            service_type: "_lan-bt-audio._tcp.local.".into(),
        };
        let mut results = BrowseResults::from_records(vec![record.clone()]);
        assert_eq!(results.next().await, Some(record));
        assert_eq!(results.next().await, None);
    }

    #[tokio::test]
    async fn test_disabled_finds_nothing() {
        let mut results = NoDiscovery.browse("_x._tcp.local.", Duration::from_millis(10)).unwrap();
        assert!(results.next().await.is_none());
    }

    #[test]
    fn test_short_host_name() {
        assert_eq!(short_host_name("desk.example.lan"), "desk");
        assert_eq!(short_host_name(" den "), "den");
        assert_eq!(short_host_name(""), "lan-audio");
    }

    #[test]
    fn test_instance_name_uses_os_hostname() {
        let host = gethostname::gethostname().to_string_lossy().into_owned();
        let name = default_instance_name();
        assert!(name.starts_with(short_host_name(&host)));
    }

    #[test]
    fn test_instance_name_has_ip() {
        let name = default_instance_name();
        let (_, ip) = name.rsplit_once('-').unwrap();
        assert!(ip.parse::<std::net::IpAddr>().is_ok());
    }
}
