//! Striping and download planning
//!
//! Store side: blocks are dealt round-robin over the chosen peers so no
//! peer ends up owning a skewed share. Retrieval side: peers take turns
//! claiming one still-needed shard they host, which spreads requests over
//! as many distinct peers as possible. Both are pure and deterministic.

use crate::checksum::Checksum;
use crate::error::{CairnError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Deal blocks round-robin: peer `i` gets items `i`, `i + P`, `i + 2P`, ...
pub fn allocate<P, T>(items: Vec<T>, peers: &[P]) -> Result<BTreeMap<P, Vec<T>>>
where
    P: Ord + Clone,
{
    if peers.is_empty() && !items.is_empty() {
        return Err(CairnError::NotAvailable(format!(
            "no peers to allocate {} blocks to",
            items.len()
        )));
    }

    let mut allocations: BTreeMap<P, Vec<T>> = BTreeMap::new();
    for (i, item) in items.into_iter().enumerate() {
        allocations
            .entry(peers[i % peers.len()].clone())
            .or_default()
            .push(item);
    }
    Ok(allocations)
}

/// Decides which peer receives which block at store time
pub trait Allocator: Send + Sync {
    fn allocate<P: Ord + Clone, T>(&self, items: Vec<T>, peers: &[P]) -> Result<BTreeMap<P, Vec<T>>>;
}

/// Round-robin dealing
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl Allocator for RoundRobin {
    fn allocate<P: Ord + Clone, T>(&self, items: Vec<T>, peers: &[P]) -> Result<BTreeMap<P, Vec<T>>> {
        allocate(items, peers)
    }
}

/// One shard a retrieval needs: its layout position and checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Need {
    pub position: usize,
    pub checksum: Checksum,
}

/// Build a peer -> positions plan covering every needed shard.
///
/// `hosts` lists, per needed shard, the peers holding it. Peers (in sorted
/// order) take turns claiming the lowest still-needed position they host
/// until nothing is left. A shard with no host fails fast with
/// `UnsatisfiableDownload` instead of looping.
pub fn download_itinerary<P>(hosts: &BTreeMap<Need, BTreeSet<P>>) -> Result<BTreeMap<P, Vec<usize>>>
where
    P: Ord + Clone,
{
    if let Some((need, _)) = hosts.iter().find(|(_, peers)| peers.is_empty()) {
        return Err(CairnError::UnsatisfiableDownload {
            position: need.position,
            checksum: need.checksum.to_hex(),
        });
    }

    let peers: BTreeSet<P> = hosts.values().flatten().cloned().collect();
    let mut remaining: BTreeSet<&Need> = hosts.keys().collect();
    let mut itinerary: BTreeMap<P, Vec<usize>> = BTreeMap::new();

    // Every remaining shard has a host, so each round claims at least one
    while !remaining.is_empty() {
        for peer in &peers {
            let claim = remaining
                .iter()
                .copied()
                .find(|need| hosts[*need].contains(peer));
            if let Some(need) = claim {
                remaining.remove(need);
                itinerary
                    .entry(peer.clone())
                    .or_default()
                    .push(need.position);
            }
        }
    }

    Ok(itinerary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn need(position: usize) -> Need {
        Need {
            position,
            checksum: Checksum::compute(&position.to_le_bytes()),
        }
    }

    fn hosts(entries: &[(usize, &[&'static str])]) -> BTreeMap<Need, BTreeSet<&'static str>> {
        entries
            .iter()
            .map(|(p, peers)| (need(*p), peers.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_round_robin_order() {
        let peers = ["a", "b", "c"];
        let plan = allocate((0..7).collect(), &peers).unwrap();
        assert_eq!(plan["a"], vec![0, 3, 6]);
        assert_eq!(plan["b"], vec![1, 4]);
        assert_eq!(plan["c"], vec![2, 5]);
    }

    #[test]
    fn test_allocation_is_balanced() {
        for blocks in 0..20usize {
            for peer_count in 1..6usize {
                let peers: Vec<usize> = (0..peer_count).collect();
                let plan = RoundRobin.allocate((0..blocks).collect::<Vec<_>>(), &peers).unwrap();
                let sizes: Vec<usize> = peers
                    .iter()
                    .map(|p| plan.get(p).map_or(0, Vec::len))
                    .collect();
                let max = *sizes.iter().max().unwrap();
                let min = *sizes.iter().min().unwrap();
                assert!(max - min <= 1);
                assert_eq!(sizes.iter().sum::<usize>(), blocks);
            }
        }
    }

    #[test]
    fn test_allocate_without_peers() {
        let peers: [&str; 0] = [];
        assert!(allocate(vec![1], &peers).is_err());
        assert!(allocate(Vec::<u8>::new(), &peers).unwrap().is_empty());
    }

    #[test]
    fn test_itinerary_spreads_over_peers() {
        let table = hosts(&[(0, &["a", "b"]), (1, &["a", "b"]), (2, &["a", "c"])]);
        let plan = download_itinerary(&table).unwrap();
        assert_eq!(plan["a"], vec![0]);
        assert_eq!(plan["b"], vec![1]);
        assert_eq!(plan["c"], vec![2]);
    }

    #[test]
    fn test_itinerary_single_host_takes_all() {
        let table = hosts(&[(0, &["a"]), (1, &["a"]), (2, &["a"])]);
        let plan = download_itinerary(&table).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan["a"], vec![0, 1, 2]);
    }

    #[test]
    fn test_itinerary_covers_every_need_once() {
        let table = hosts(&[
            (0, &["a", "b", "c"]),
            (1, &["b"]),
            (2, &["c"]),
            (3, &["a", "c"]),
            (4, &["b", "c"]),
        ]);
        let plan = download_itinerary(&table).unwrap();
        let mut claimed: Vec<usize> = plan.values().flatten().copied().collect();
        claimed.sort_unstable();
        assert_eq!(claimed, vec![0, 1, 2, 3, 4]);
        for (peer, positions) in &plan {
            for p in positions {
                assert!(table[&need(*p)].contains(peer));
            }
        }
    }

    #[test]
    fn test_itinerary_deterministic() {
        let table = hosts(&[(0, &["b", "a"]), (1, &["a", "b"]), (2, &["b"])]);
        assert_eq!(
            download_itinerary(&table).unwrap(),
            download_itinerary(&table).unwrap()
        );
    }

    #[test]
    fn test_unsatisfiable_download() {
        let table = hosts(&[(0, &["a"]), (1, &[])]);
        assert!(matches!(
            download_itinerary(&table),
            Err(CairnError::UnsatisfiableDownload { position: 1, .. })
        ));
    }
}
