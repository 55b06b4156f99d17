// This module provides GridConfig, the static description of the chip grid the graph is
// placed on: per-chip logical grid sizes, the Ethernet-core membership set that decides
// which base address, budget and tile-header formula apply to a coordinate, and the
// optional worker-core override set used when emitting invalid-epoch blobs for unused
// coordinates. It also owns the two pieces of coordinate arithmetic everything else
// leans on: the wraparound-and-skip-Ethernet stepping used to walk multicast rectangles,
// and the NOC-1 coordinate flip (NOC plane 1 addresses the grid mirrored, except for
// translated ids of 16 and up when the NOC translation tables are enabled).

//! Chip grid description, core classification and coordinate stepping.

use hashbrown::{HashMap, HashSet};

use crate::core::config::BlobGenConfig;

/// Static grid data shared by every compilation stage.
#[derive(Debug, Clone, Default)]
pub struct GridConfig {
    /// Logical grid extent per chip id.
    pub grid_size_x: HashMap<u32, u32>,
    pub grid_size_y: HashMap<u32, u32>,
    /// (y, x) coordinates hosting Ethernet cores, on every chip.
    eth_cores: HashSet<(u32, u32)>,
    /// Non-empty when only an explicit subset of coordinates are workers.
    worker_cores: HashSet<(u32, u32)>,
}

impl GridConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_chip(&mut self, chip: u32, size_y: u32, size_x: u32) {
        self.grid_size_y.insert(chip, size_y);
        self.grid_size_x.insert(chip, size_x);
    }

    pub fn add_eth_core(&mut self, y: u32, x: u32) {
        self.eth_cores.insert((y, x));
    }

    pub fn add_worker_core(&mut self, y: u32, x: u32) {
        self.worker_cores.insert((y, x));
    }

    pub fn is_ethernet(&self, y: u32, x: u32) -> bool {
        self.eth_cores.contains(&(y, x))
    }

    pub fn is_worker(&self, y: u32, x: u32) -> bool {
        self.worker_cores.contains(&(y, x))
    }

    /// True when an explicit worker set restricts which unused coordinates
    /// receive invalid-epoch blobs.
    pub fn worker_override_enabled(&self) -> bool {
        !self.worker_cores.is_empty()
    }

    /// Logical grid extent of one chip as (size_y, size_x).
    pub fn chip_size(&self, chip: u32) -> (u32, u32) {
        (
            self.grid_size_y.get(&chip).copied().unwrap_or(1),
            self.grid_size_x.get(&chip).copied().unwrap_or(1),
        )
    }

    pub fn chip_ids(&self) -> impl Iterator<Item = u32> + '_ {
        let mut ids: Vec<u32> = self.grid_size_x.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
    }

    /// Next x to the right with wraparound, skipping Ethernet columns.
    pub fn next_higher_worker_x(&self, chip: u32, y: u32, x: u32) -> u32 {
        let size = self.grid_size_x.get(&chip).copied().unwrap_or(1);
        let mut x = (x + 1) % size;
        while self.is_ethernet(y, x) {
            x = (x + 1) % size;
        }
        x
    }

    /// Next y downward with wraparound, skipping Ethernet rows.
    pub fn next_higher_worker_y(&self, chip: u32, y: u32, x: u32) -> u32 {
        let size = self.grid_size_y.get(&chip).copied().unwrap_or(1);
        let mut y = (y + 1) % size;
        while self.is_ethernet(y, x) {
            y = (y + 1) % size;
        }
        y
    }
}

/// NOC-1 x coordinate for a NOC-0 id.
pub fn noc1_x_id(cfg: &BlobGenConfig, id: u32) -> u32 {
    if cfg.noc_translation_id_enabled && id >= 16 {
        id
    } else {
        cfg.noc_x_size - 1 - id
    }
}

/// NOC-1 y coordinate for a NOC-0 id.
pub fn noc1_y_id(cfg: &BlobGenConfig, id: u32) -> u32 {
    if cfg.noc_translation_id_enabled && id >= 16 {
        id
    } else {
        cfg.noc_y_size - 1 - id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraparound_skips_ethernet() {
        let mut grid = GridConfig::new();
        grid.add_chip(0, 4, 4);
        grid.add_eth_core(0, 2);

        // Walking x along y=0 must skip the Ethernet column at x=2.
        assert_eq!(grid.next_higher_worker_x(0, 0, 1), 3);
        // Wrap from the right edge back to column 0.
        assert_eq!(grid.next_higher_worker_x(0, 0, 3), 0);
        // Other rows are unaffected.
        assert_eq!(grid.next_higher_worker_x(0, 1, 1), 2);
    }

    #[test]
    fn test_noc1_flip() {
        let cfg = BlobGenConfig {
            noc_x_size: 10,
            noc_y_size: 12,
            ..Default::default()
        };
        assert_eq!(noc1_x_id(&cfg, 0), 9);
        assert_eq!(noc1_y_id(&cfg, 11), 0);

        let translated = BlobGenConfig {
            noc_translation_id_enabled: true,
            noc_x_size: 10,
            ..Default::default()
        };
        assert_eq!(noc1_x_id(&translated, 18), 18);
        assert_eq!(noc1_x_id(&translated, 2), 7);
    }
}
