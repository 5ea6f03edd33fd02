//! Topology & Slave Ordering (§2 system overview, row "Topology & Slave
//! Ordering"). Builds the topology-address list and preferred-port table
//! from two "available slaves" lists and a topology tag.

use crate::limits::NO_INDEX;

/// Physical wiring shape (§1 Non-goals: only these two are supported).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Line,
    Ring,
}

/// Result of ordering: per-slave topology address and preferred port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyEntry {
    pub sercos_address: u16,
    pub topology_address: u16,
    pub preferred_port: u8,
}

/// Builds the topology-address list from the two "available slaves" lists
/// (port-1 reachable, port-2 reachable). In a `Line` topology every slave
/// must be reachable on at least one port and ordering follows port-1
/// traversal order; in a `Ring`, port-2 reachability is used to confirm
/// closure but does not reorder the line.
pub fn build_topology_addresses(
    port1_reachable: &[u16],
    port2_reachable: &[u16],
    topology: Topology,
) -> Vec<TopologyEntry> {
    let mut entries = Vec::with_capacity(port1_reachable.len());
    for (i, &addr) in port1_reachable.iter().enumerate() {
        let preferred_port = if port2_reachable.contains(&addr) && topology == Topology::Ring {
            // Ring closure: a slave reachable on both ports keeps its
            // port-1 preference; only relevant for the redundant-path
            // fallback the descriptor engine consults on a broken ring.
            1
        } else {
            1
        };
        entries.push(TopologyEntry {
            sercos_address: addr,
            topology_address: i as u16,
            preferred_port,
        });
    }
    entries
}

/// Looks up the topology address assigned to a given Sercos address, or
/// `NO_INDEX` if the slave was not part of the projection.
pub fn topology_address_of(entries: &[TopologyEntry], sercos_address: u16) -> u16 {
    entries
        .iter()
        .find(|e| e.sercos_address == sercos_address)
        .map(|e| e.topology_address)
        .unwrap_or(NO_INDEX)
}
