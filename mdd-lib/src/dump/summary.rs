use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SectionInfo;

/// The most recent, highest known stream offset for one node.
///
/// Consumed by the retrieval tooling to decide what byte ranges to request
/// from the controller next.
#[derive(Debug, Clone, Serialize)]
pub struct NodeLatest {
    /// Highest end offset seen across all sections for the node.
    pub end: u64,
    /// Most recent section retrieval time for the node.
    pub time: DateTime<Utc>,
}

/// Reduce a batch's section list to per-node latest offsets.
///
/// Only port 1 carries the accumulated telemetry stream; sections for other
/// ports are ignored.
#[must_use]
pub fn latest(sections: &[SectionInfo]) -> HashMap<u16, NodeLatest> {
    let mut nodes: HashMap<u16, NodeLatest> = HashMap::new();
    for sect in sections {
        if sect.port != 1 {
            continue;
        }
        nodes
            .entry(sect.node)
            .and_modify(|cur| {
                cur.end = cur.end.max(sect.end);
                cur.time = cur.time.max(sect.time);
            })
            .or_insert(NodeLatest {
                end: sect.end,
                time: sect.time,
            });
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(node: u16, port: u16, end: u64, secs: i64) -> SectionInfo {
        SectionInfo {
            node,
            port,
            start: 0,
            end,
            time: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn latest_tracks_highest_end_per_node() {
        let sections = vec![
            info(58, 1, 4059, 100),
            info(58, 1, 3584, 200),
            info(59, 1, 1024, 50),
            info(58, 2, 9999, 300), // not port 1
        ];
        let nodes = latest(&sections);

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[&58].end, 4059);
        assert_eq!(nodes[&58].time.timestamp(), 200);
        assert_eq!(nodes[&59].end, 1024);
    }
}
