use crate::taxonomy::{Region, RegionTable};
use std::collections::{BTreeMap, HashMap};

/// Resolve a region's channel labels against a recording's labels.
///
/// Returns row indices in region-list order. Labels missing from the
/// recording are dropped; an empty result is valid and means "no data".
pub fn resolve_channels(recording_labels: &[String], region_labels: &[String]) -> Vec<usize> {
    ChannelResolver::new(recording_labels, false).resolve(region_labels)
}

/// Label → row lookup for one recording
pub struct ChannelResolver {
    index: HashMap<String, usize>,
    case_insensitive: bool,
}

impl ChannelResolver {
    pub fn new(recording_labels: &[String], case_insensitive: bool) -> Self {
        let mut index = HashMap::with_capacity(recording_labels.len());
        for (i, label) in recording_labels.iter().enumerate() {
            index.entry(Self::key(label, case_insensitive)).or_insert(i);
        }
        Self {
            index,
            case_insensitive,
        }
    }

    // Exact mode compares labels byte for byte; the relaxed mode also
    // ignores surrounding whitespace.
    fn key(label: &str, case_insensitive: bool) -> String {
        if case_insensitive {
            label.trim().to_lowercase()
        } else {
            label.to_string()
        }
    }

    pub fn resolve(&self, region_labels: &[String]) -> Vec<usize> {
        let mut indices = Vec::with_capacity(region_labels.len());
        for label in region_labels {
            if let Some(&idx) = self.index.get(&Self::key(label, self.case_insensitive)) {
                if !indices.contains(&idx) {
                    indices.push(idx);
                }
            }
        }
        indices
    }

    pub fn resolve_regions(&self, regions: &RegionTable) -> ResolvedRegions {
        let map = Region::ALL
            .iter()
            .map(|&region| (region, self.resolve(regions.labels(region))))
            .collect();
        ResolvedRegions { map }
    }
}

/// Row indices per region for one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRegions {
    map: BTreeMap<Region, Vec<usize>>,
}

impl ResolvedRegions {
    pub fn get(&self, region: Region) -> &[usize] {
        self.map.get(&region).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Region, &[usize])> {
        self.map.iter().map(|(r, idx)| (*r, idx.as_slice()))
    }
}
