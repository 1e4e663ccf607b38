//! Address ranges and interval merging.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::db::tables::RangeEntry;
use crate::db::DHCP_SERVER_IPV4_RANGE;
use crate::diagnostics::Diagnostics;

/// An inclusive IPv4 interval. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IpRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl IpRange {
    /// `None` when `end` precedes `start`.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(addr: Ipv4Addr) -> Self {
        Self { start: addr, end: addr }
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Both endpoints lie inside `net`.
    pub fn within(&self, net: &Ipv4Net) -> bool {
        net.contains(&self.start) && net.contains(&self.end)
    }

    /// The two intervals share at least one address.
    pub fn overlaps(&self, other: &IpRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// Validate the range table. Bad rows are skipped with a diagnostic.
pub fn parse_range(entries: &[RangeEntry], diags: &mut Diagnostics) -> BTreeMap<String, IpRange> {
    let mut ranges = BTreeMap::new();
    for entry in entries {
        let (first, last) = match entry.endpoints.as_slice() {
            [only] => (only, only),
            [first, last] => (first, last),
            other => {
                diags.skip(
                    DHCP_SERVER_IPV4_RANGE,
                    &entry.name,
                    format!("range has {} endpoints, expected 1 or 2", other.len()),
                );
                continue;
            }
        };
        let (Ok(start), Ok(end)) = (first.parse::<Ipv4Addr>(), last.parse::<Ipv4Addr>()) else {
            diags.skip(
                DHCP_SERVER_IPV4_RANGE,
                &entry.name,
                format!("invalid IPv4 endpoint in [{first}, {last}]"),
            );
            continue;
        };
        match IpRange::new(start, end) {
            Some(range) => {
                ranges.insert(entry.name.clone(), range);
            }
            None => diags.skip(
                DHCP_SERVER_IPV4_RANGE,
                &entry.name,
                format!("start {start} is greater than end {end}"),
            ),
        }
    }
    ranges
}

/// Sort and merge overlapping intervals. Touching-but-disjoint intervals
/// (`[1,2]`, `[3,4]`) stay separate.
pub fn merge_intervals(mut ranges: Vec<IpRange>) -> Vec<IpRange> {
    ranges.sort();
    let mut merged: Vec<IpRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}
