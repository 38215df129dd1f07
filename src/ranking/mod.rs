//! Orderings applied to probed regions before they are published
//!
//! The ordering is picked once at startup from the `--order-by` and
//! `--order-direction` flags. Latency orders only move regions that have a
//! measured latency; unmeasured regions keep their slot. Name orders break
//! ties by descending latency whatever the name direction.

use crate::error::{AppError, Result};
use crate::models::Region;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Accepted `--order-by` values
pub const ORDER_BY_NAME: &str = "name";
pub const ORDER_BY_LATENCY: &str = "latency";

/// Accepted `--order-direction` values
pub const ASCENDING_ORDER: &str = "asc";
pub const DESCENDING_ORDER: &str = "desc";

/// What regions are sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Latency,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case(ORDER_BY_NAME) {
            Ok(SortKey::Name)
        } else if s.eq_ignore_ascii_case(ORDER_BY_LATENCY) {
            Ok(SortKey::Latency)
        } else {
            Err(AppError::config(format!(
                "unknown order type '{}': accepted values are {} or {}",
                s, ORDER_BY_NAME, ORDER_BY_LATENCY
            )))
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case(ASCENDING_ORDER) {
            Ok(SortDirection::Ascending)
        } else if s.eq_ignore_ascii_case(DESCENDING_ORDER) {
            Ok(SortDirection::Descending)
        } else {
            Err(AppError::config(format!(
                "unknown order direction '{}': accepted values are {} or {}",
                s, ASCENDING_ORDER, DESCENDING_ORDER
            )))
        }
    }
}

/// The four supported orderings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ranking {
    LatencyAscending,
    LatencyDescending,
    NameAscending,
    NameDescending,
}

impl Ranking {
    /// Build the ranking for a (key, direction) pair
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        match (key, direction) {
            (SortKey::Latency, SortDirection::Ascending) => Ranking::LatencyAscending,
            (SortKey::Latency, SortDirection::Descending) => Ranking::LatencyDescending,
            (SortKey::Name, SortDirection::Ascending) => Ranking::NameAscending,
            (SortKey::Name, SortDirection::Descending) => Ranking::NameDescending,
        }
    }

    /// Parse the raw flag values, case-insensitively
    pub fn from_options(order_by: &str, direction: &str) -> Result<Self> {
        Ok(Self::new(order_by.parse()?, direction.parse()?))
    }

    pub fn key(&self) -> SortKey {
        match self {
            Ranking::LatencyAscending | Ranking::LatencyDescending => SortKey::Latency,
            Ranking::NameAscending | Ranking::NameDescending => SortKey::Name,
        }
    }

    pub fn direction(&self) -> SortDirection {
        match self {
            Ranking::LatencyAscending | Ranking::NameAscending => SortDirection::Ascending,
            Ranking::LatencyDescending | Ranking::NameDescending => SortDirection::Descending,
        }
    }

    /// Compare two regions; `None` means the pair has no defined order
    /// (a latency ordering where either side is unmeasured)
    pub fn compare(&self, a: &Region, b: &Region) -> Option<Ordering> {
        match self {
            Ranking::LatencyAscending => Some(a.best_latency()?.cmp(&b.best_latency()?)),
            Ranking::LatencyDescending => Some(b.best_latency()?.cmp(&a.best_latency()?)),
            Ranking::NameAscending => Some(a.name.cmp(&b.name).then_with(|| by_latency_desc(a, b))),
            Ranking::NameDescending => Some(b.name.cmp(&a.name).then_with(|| by_latency_desc(a, b))),
        }
    }

    /// Sort regions in place; the sort is stable
    pub fn sort(&self, regions: &mut [Region]) {
        match self.key() {
            SortKey::Name => regions.sort_by(|a, b| self.compare(a, b).unwrap_or(Ordering::Equal)),
            SortKey::Latency => self.sort_measured_in_place(regions),
        }
    }

    /// Sort, then keep at most `max_regions` entries (0 keeps everything)
    pub fn rank(&self, mut regions: Vec<Region>, max_regions: usize) -> Vec<Region> {
        self.sort(&mut regions);
        if max_regions > 0 {
            regions.truncate(max_regions);
        }
        regions
    }

    // Unmeasured regions are not comparable by latency, so they stay where
    // they are and only the measured ones are reordered among their slots.
    fn sort_measured_in_place(&self, regions: &mut [Region]) {
        let slots: Vec<usize> = regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.best_latency().is_some())
            .map(|(i, _)| i)
            .collect();

        let mut measured: Vec<Region> = slots.iter().map(|&i| regions[i].clone()).collect();
        measured.sort_by(|a, b| self.compare(a, b).unwrap_or(Ordering::Equal));

        for (slot, region) in slots.into_iter().zip(measured) {
            regions[slot] = region;
        }
    }
}

/// Greater latency first; unmeasured after every measured one
fn by_latency_desc(a: &Region, b: &Region) -> Ordering {
    b.best_latency().cmp(&a.best_latency())
}

impl fmt::Display for Ranking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = match self.key() {
            SortKey::Name => ORDER_BY_NAME,
            SortKey::Latency => ORDER_BY_LATENCY,
        };
        let direction = match self.direction() {
            SortDirection::Ascending => ASCENDING_ORDER,
            SortDirection::Descending => DESCENDING_ORDER,
        };
        write!(f, "{} {}", key, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Server, ServerGroup};
    use proptest::prelude::*;
    use std::time::Duration;

    fn region(name: &str, latency_ms: Option<u64>) -> Region {
        Region {
            id: name.to_lowercase(),
            name: name.to_string(),
            servers: ServerGroup {
                wg: vec![Server {
                    ip: "10.0.0.1".to_string(),
                    cn: name.to_lowercase(),
                    van: false,
                    latency: latency_ms.map(Duration::from_millis),
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn summary(regions: &[Region]) -> Vec<(String, Option<u64>)> {
        regions
            .iter()
            .map(|r| (r.name.clone(), r.best_latency().map(|d| d.as_millis() as u64)))
            .collect()
    }

    #[test]
    fn test_from_options() {
        assert_eq!(Ranking::from_options("name", "asc").unwrap(), Ranking::NameAscending);
        assert_eq!(Ranking::from_options("NAME", "Desc").unwrap(), Ranking::NameDescending);
        assert_eq!(Ranking::from_options("latency", "asc").unwrap(), Ranking::LatencyAscending);
        assert_eq!(Ranking::from_options("Latency", "DESC").unwrap(), Ranking::LatencyDescending);
    }

    #[test]
    fn test_unknown_options_are_config_errors() {
        assert!(matches!(Ranking::from_options("country", "asc"), Err(AppError::Config(_))));
        assert!(matches!(Ranking::from_options("name", "up"), Err(AppError::Config(_))));
        assert!(matches!(Ranking::from_options("", ""), Err(AppError::Config(_))));
    }

    #[test]
    fn test_name_ascending_breaks_ties_by_descending_latency() {
        let mut regions = vec![region("B", Some(5)), region("A", Some(10)), region("A", Some(3))];
        Ranking::NameAscending.sort(&mut regions);

        assert_eq!(
            summary(&regions),
            vec![
                ("A".to_string(), Some(10)),
                ("A".to_string(), Some(3)),
                ("B".to_string(), Some(5)),
            ]
        );
    }

    #[test]
    fn test_name_descending_keeps_descending_latency_tie_break() {
        let mut regions = vec![region("A", Some(3)), region("B", Some(5)), region("A", Some(10))];
        Ranking::NameDescending.sort(&mut regions);

        assert_eq!(
            summary(&regions),
            vec![
                ("B".to_string(), Some(5)),
                ("A".to_string(), Some(10)),
                ("A".to_string(), Some(3)),
            ]
        );
    }

    #[test]
    fn test_latency_orders() {
        let regions = vec![region("slow", Some(40)), region("fast", Some(4)), region("mid", Some(20))];

        let mut ascending = regions.clone();
        Ranking::LatencyAscending.sort(&mut ascending);
        assert_eq!(
            ascending.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["fast", "mid", "slow"]
        );

        let mut descending = regions;
        Ranking::LatencyDescending.sort(&mut descending);
        assert_eq!(
            descending.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["slow", "mid", "fast"]
        );
    }

    #[test]
    fn test_unmeasured_regions_keep_their_slot() {
        let mut regions = vec![
            region("c", Some(30)),
            region("unmeasured", None),
            region("a", Some(10)),
            region("b", Some(20)),
        ];
        Ranking::LatencyAscending.sort(&mut regions);

        assert_eq!(
            regions.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "unmeasured", "b", "c"]
        );
        assert_eq!(Ranking::LatencyAscending.compare(&regions[0], &regions[1]), None);
    }

    #[test]
    fn test_rank_truncates() {
        let regions = vec![region("c", Some(3)), region("a", Some(1)), region("b", Some(2))];

        let ranked = Ranking::NameAscending.rank(regions.clone(), 2);
        assert_eq!(ranked.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let unlimited = Ranking::NameAscending.rank(regions, 0);
        assert_eq!(unlimited.len(), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(Ranking::LatencyDescending.to_string(), "latency desc");
        assert_eq!(Ranking::NameAscending.to_string(), "name asc");
    }

    proptest! {
        #[test]
        fn prop_latency_directions_are_reverses(latencies in prop::collection::vec(0u64..10_000, 0..40)) {
            // distinct latencies so that the reverse is exact
            let mut unique = latencies.clone();
            unique.sort_unstable();
            unique.dedup();

            let regions: Vec<Region> = unique
                .iter()
                .rev()
                .enumerate()
                .map(|(i, ms)| region(&format!("r{i}"), Some(*ms)))
                .collect();

            let mut ascending = regions.clone();
            Ranking::LatencyAscending.sort(&mut ascending);
            let mut descending = regions;
            Ranking::LatencyDescending.sort(&mut descending);

            descending.reverse();
            prop_assert_eq!(ascending, descending);
        }

        #[test]
        fn prop_sorting_never_loses_regions(
            entries in prop::collection::vec((0u8..5, prop::option::of(0u64..500)), 0..40)
        ) {
            let regions: Vec<Region> = entries
                .iter()
                .map(|(n, ms)| region(&format!("n{n}"), *ms))
                .collect();

            for ranking in [
                Ranking::LatencyAscending,
                Ranking::LatencyDescending,
                Ranking::NameAscending,
                Ranking::NameDescending,
            ] {
                let mut sorted = regions.clone();
                ranking.sort(&mut sorted);
                prop_assert_eq!(sorted.len(), regions.len());
                for r in &regions {
                    prop_assert!(sorted.contains(r));
                }
            }
        }
    }
}
