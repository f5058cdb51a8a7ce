//! mDNS backend

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Advertisement, BrowseResults, Discovery, DiscoveryRecord};
use crate::error::DiscoveryError;
use crate::network::local_ipv4;

pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
}

impl MdnsDiscovery {
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;
        Ok(Self { daemon })
    }
}

impl Discovery for MdnsDiscovery {
    fn advertise(&self, ad: &Advertisement) -> Result<(), DiscoveryError> {
        let ip = local_ipv4().to_string();
        let host_name = format!("{}.local.", ad.instance_name);
        let mut properties = HashMap::new();
        properties.insert("path".to_string(), ad.path_hint.clone());

        let service = ServiceInfo::new(
            &ad.service_type,
            &ad.instance_name,
            &host_name,
            ip.as_str(),
            ad.port,
            properties,
        )
        .map_err(|e| DiscoveryError::Register(e.to_string()))?;

        self.daemon
            .register(service)
            .map_err(|e| DiscoveryError::Register(e.to_string()))?;

        info!("Advertising {} as {} on {}:{}", ad.service_type, ad.instance_name, ip, ad.port);
        Ok(())
    }

    fn browse(
        &self,
        service_type: &str,
        timeout: Duration,
    ) -> Result<BrowseResults, DiscoveryError> {
        let events = self
            .daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;

        let (tx, rx) = mpsc::channel(32);
        let daemon = self.daemon.clone();
        let service_type = service_type.to_string();

        tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + timeout;
            let mut seen = HashSet::new();

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                let event = match events.recv_timeout(remaining) {
                    Ok(event) => event,
                    Err(_) => break,
                };
                let ServiceEvent::ServiceResolved(info) = event else {
                    continue;
                };
                if !seen.insert(info.get_fullname().to_string()) {
                    continue;
                }
                let Some(record) = to_record(&info, &service_type) else {
                    debug!("Resolved {} without an address", info.get_fullname());
                    continue;
                };
                if tx.blocking_send(record).is_err() {
                    break;
                }
            }

            if let Err(e) = daemon.stop_browse(&service_type) {
                warn!("Failed to stop browsing {}: {}", service_type, e);
            }
        });

        Ok(BrowseResults::new(rx))
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        let _ = self.daemon.shutdown();
    }
}

fn to_record(info: &ServiceInfo, service_type: &str) -> Option<DiscoveryRecord> {
    let addresses: Vec<IpAddr> = info.get_addresses().iter().map(|ip| (*ip).into()).collect();
    let ip = addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .copied()?;

    Some(DiscoveryRecord {
        display_name: display_name(info.get_fullname(), service_type),
        address: SocketAddr::new(ip, info.get_port()).to_string(),
        service_type: service_type.to_string(),
    })
}

/// `desk-10.0.0.7._lan-bt-audio._tcp.local.` becomes `desk-10.0.0.7`
fn display_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let ty = "_lan-bt-audio._tcp.local.";
        assert_eq!(display_name("desk-10.0.0.7._lan-bt-audio._tcp.local.", ty), "desk-10.0.0.7");
        assert_eq!(display_name("odd.name", ty), "odd.name");
    }
}
