//! Metadata Layout.
//!
//! Maps every protected data block to the metadata lines that protect it. The regions
//! are laid out contiguously above the protected data:
//!
//! ```text
//! [0, P)                     protected data, 64-byte blocks
//! [P, P + 8B)                MAC region, one 8-byte MAC per block
//! [.., + 8B)                 counter region, one 8-byte counter per block
//! level 1 .. level L         tree nodes, 64 bytes each, eight child tags per node
//! ```
//!
//! Level 1 covers counter lines, level k covers level k-1 nodes, and the top level
//! has exactly one node whose tag (the root) stays on chip. The mapping is injective
//! and fixed for the lifetime of a `MetadataLayout`.

use crate::common::addr::{LineAddr, SlotRef};
use crate::common::constants::{
    BLOCK_BYTES, BLOCK_SHIFT, LINE_BYTES, MAX_TREE_LEVELS, MIN_PROTECTED_BYTES, SLOT_BYTES,
    SLOTS_PER_LINE, TREE_ARITY,
};
use crate::common::{ProtectedUnit, SecError};

/// Kind of metadata line, as classified from its address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Eight block MACs.
    Mac,
    /// Eight block counters.
    Counter,
    /// Tree node at the given level (1 = directly above the counter lines).
    Node(u8),
}

impl LineKind {
    /// Returns the unit a verification failure on this line is reported as.
    pub const fn unit(self) -> ProtectedUnit {
        match self {
            Self::Mac => ProtectedUnit::Mac,
            Self::Counter => ProtectedUnit::Counter,
            Self::Node(level) => ProtectedUnit::TreeNode(level),
        }
    }

    /// Returns `true` for lines covered by the integrity tree (counter lines and nodes).
    pub const fn is_tree_line(self) -> bool {
        !matches!(self, Self::Mac)
    }
}

/// One line on the verification chain of a block: level 0 is its counter line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainLink {
    /// Tree level (0 = counter line).
    pub level: u8,
    /// Index of the line within its level.
    pub index: u64,
    /// Address of the line.
    pub line: LineAddr,
}

impl ChainLink {
    /// Returns the kind of line this link refers to.
    pub const fn kind(&self) -> LineKind {
        if self.level == 0 {
            LineKind::Counter
        } else {
            LineKind::Node(self.level)
        }
    }

    /// Slot in the parent line that carries this line's tag.
    pub const fn parent_slot(&self) -> usize {
        (self.index % TREE_ARITY) as usize
    }
}

/// All metadata a single data block depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaPath {
    /// Block index.
    pub block: u64,
    /// Slot holding the block's MAC.
    pub mac: SlotRef,
    /// Slot holding the block's counter.
    pub counter: SlotRef,
    /// Counter line followed by every ancestor node up to the top level.
    pub chain: Vec<ChainLink>,
}

impl MetaPath {
    /// Lines in acquisition order: MAC line, counter line, then tree levels bottom-up.
    pub fn lines(&self) -> Vec<LineAddr> {
        let mut lines = Vec::with_capacity(self.chain.len() + 1);
        lines.push(self.mac.line);
        lines.extend(self.chain.iter().map(|link| link.line));
        lines
    }

    /// Returns the chain link for a tree level, if the path reaches it.
    pub fn link(&self, level: u8) -> Option<&ChainLink> {
        self.chain.get(level as usize)
    }
}

/// Address arithmetic for the MAC, counter and tree regions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataLayout {
    protected_bytes: u64,
    blocks: u64,
    mac_base: u64,
    counter_base: u64,
    /// Base address of levels 1..=L (index k-1 holds level k).
    level_bases: Vec<u64>,
    /// Node count of levels 1..=L.
    level_nodes: Vec<u64>,
    end: u64,
}

impl MetadataLayout {
    /// Builds the layout for a protected region of `protected_bytes`.
    ///
    /// # Arguments
    ///
    /// * `protected_bytes` - Size of the protected region; a power of two of at least 4 KiB.
    ///
    /// # Returns
    ///
    /// The layout, or `SecError::Config` if the size is unusable.
    pub fn new(protected_bytes: u64) -> Result<Self, SecError> {
        if protected_bytes < MIN_PROTECTED_BYTES || !protected_bytes.is_power_of_two() {
            return Err(SecError::Config(format!(
                "protected region of {protected_bytes} bytes is not a power of two >= {MIN_PROTECTED_BYTES}"
            )));
        }

        let blocks = protected_bytes >> BLOCK_SHIFT;
        let region_bytes = blocks * SLOT_BYTES;
        let mac_base = protected_bytes;
        let counter_base = mac_base + region_bytes;

        let mut level_bases = Vec::new();
        let mut level_nodes = Vec::new();
        let mut base = counter_base + region_bytes;
        let mut below = blocks / SLOTS_PER_LINE;
        loop {
            let nodes = below.div_ceil(TREE_ARITY);
            level_bases.push(base);
            level_nodes.push(nodes);
            base += nodes * LINE_BYTES as u64;
            below = nodes;
            if nodes == 1 {
                break;
            }
            if level_bases.len() >= MAX_TREE_LEVELS {
                return Err(SecError::Config(format!(
                    "protected region of {protected_bytes} bytes needs more than {MAX_TREE_LEVELS} tree levels"
                )));
            }
        }

        Ok(Self {
            protected_bytes,
            blocks,
            mac_base,
            counter_base,
            level_bases,
            level_nodes,
            end: base,
        })
    }

    /// Size of the protected data region in bytes.
    pub const fn protected_bytes(&self) -> u64 {
        self.protected_bytes
    }

    /// Number of protected 64-byte blocks.
    pub const fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Number of tree levels above the counter lines (L).
    pub fn levels(&self) -> u8 {
        self.level_bases.len() as u8
    }

    /// Node count of a tree level (0 returns the number of counter lines).
    pub fn nodes_at(&self, level: u8) -> u64 {
        if level == 0 {
            self.blocks / SLOTS_PER_LINE
        } else {
            self.level_nodes
                .get(level as usize - 1)
                .copied()
                .unwrap_or_default()
        }
    }

    /// First address past the last metadata region.
    pub const fn metadata_end(&self) -> u64 {
        self.end
    }

    /// Returns `true` if `addr` lies in the protected data region.
    pub const fn contains(&self, addr: u64) -> bool {
        addr < self.protected_bytes
    }

    /// Base address of the data block with index `block`.
    pub const fn block_addr(&self, block: u64) -> u64 {
        block * BLOCK_BYTES
    }

    /// Slot holding the MAC of `block`.
    pub const fn mac_slot(&self, block: u64) -> SlotRef {
        Self::slot_in_region(self.mac_base, block)
    }

    /// Slot holding the counter of `block`.
    pub const fn counter_slot(&self, block: u64) -> SlotRef {
        Self::slot_in_region(self.counter_base, block)
    }

    const fn slot_in_region(base: u64, block: u64) -> SlotRef {
        let byte = base + block * SLOT_BYTES;
        SlotRef {
            line: LineAddr(byte & !(LINE_BYTES as u64 - 1)),
            slot: (block % SLOTS_PER_LINE) as usize,
        }
    }

    /// Address of line `index` at tree `level` (level 0 = counter lines).
    pub fn node_line(&self, level: u8, index: u64) -> LineAddr {
        let base = if level == 0 {
            self.counter_base
        } else {
            self.level_bases[level as usize - 1]
        };
        LineAddr(base + index * LINE_BYTES as u64)
    }

    /// Returns the full metadata path of `block`.
    pub fn path(&self, block: u64) -> MetaPath {
        let counter = self.counter_slot(block);
        let mut chain = Vec::with_capacity(self.level_bases.len() + 1);
        let mut index = block / SLOTS_PER_LINE;
        chain.push(ChainLink {
            level: 0,
            index,
            line: counter.line,
        });
        for level in 1..=self.levels() {
            index /= TREE_ARITY;
            chain.push(ChainLink {
                level,
                index,
                line: self.node_line(level, index),
            });
        }
        MetaPath {
            block,
            mac: self.mac_slot(block),
            counter,
            chain,
        }
    }

    /// Classifies a metadata line address.
    ///
    /// # Returns
    ///
    /// The line kind, or `None` if the address is not a metadata line of this layout.
    pub fn classify(&self, line: LineAddr) -> Option<LineKind> {
        let addr = line.val();
        if addr % LINE_BYTES as u64 != 0 || addr < self.mac_base || addr >= self.end {
            return None;
        }
        if addr < self.counter_base {
            return Some(LineKind::Mac);
        }
        if addr < self.level_bases[0] {
            return Some(LineKind::Counter);
        }
        self.level_bases
            .iter()
            .rposition(|&base| addr >= base)
            .map(|k| LineKind::Node(k as u8 + 1))
    }
}
