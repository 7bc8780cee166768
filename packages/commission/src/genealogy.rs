//! Matrix genealogy traversal
//!
//! Positions form an arena addressed by distributor id. Traversal is a series
//! of keyed store lookups, bounded by the requested depth and guarded against
//! cycles in corrupted data.

use crate::error::{CommissionError, CommissionResult};
use crate::rank::RankStats;
use crate::store::CommissionStore;
use crate::types::{Distributor, QualifyingPeriod};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// One upline slot, nearest first
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UplineEntry {
    /// Relative level, 1 is the immediate parent
    pub level: u8,
    pub distributor_id: String,
    /// `None` when the position references a missing distributor row
    pub distributor: Option<Distributor>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UplineChain {
    pub entries: Vec<UplineEntry>,
    /// Level of the last entry when its own matrix position is missing, so
    /// nothing above it could be reached
    pub broken_at: Option<u8>,
}

impl UplineChain {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, level: u8) -> Option<&UplineEntry> {
        self.entries.iter().find(|e| e.level == level)
    }
}

/// Downline node annotated with volume statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlineNode {
    pub distributor_id: String,
    pub distributor: Option<Distributor>,
    /// Slot under the parent
    pub position: u32,
    /// Depth relative to the requested root, which is 0
    pub depth: u32,
    pub personal_sales: Decimal,
    /// Own sales plus every descendant's within the depth bound
    pub team_volume: Decimal,
    /// Direct children whose subtree has any volume
    pub active_legs: u32,
    pub children: Vec<DownlineNode>,
}

impl DownlineNode {
    pub fn stats(&self) -> RankStats {
        RankStats {
            personal_sales: self.personal_sales,
            team_volume: self.team_volume,
            active_legs: self.active_legs,
        }
    }

    pub fn child(&self, distributor_id: &str) -> Option<&DownlineNode> {
        self.children
            .iter()
            .find(|c| c.distributor_id == distributor_id)
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }
}

struct ArenaNode {
    distributor_id: String,
    distributor: Option<Distributor>,
    position: u32,
    depth: u32,
    personal_sales: Decimal,
    children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct GenealogyWalker {
    store: Arc<dyn CommissionStore>,
    matrix_width: Option<u32>,
}

impl GenealogyWalker {
    pub fn new(store: Arc<dyn CommissionStore>) -> Self {
        Self {
            store,
            matrix_width: None,
        }
    }

    /// Width used to flag over-full slots while expanding downlines
    pub fn with_matrix_width(mut self, width: u32) -> Self {
        self.matrix_width = Some(width);
        self
    }

    /// Follow parent links up to `max_levels` entries
    pub async fn upline_chain(
        &self,
        distributor_id: &str,
        max_levels: u8,
    ) -> CommissionResult<UplineChain> {
        let mut current = self
            .store
            .get_matrix_position(distributor_id)
            .await?
            .ok_or_else(|| CommissionError::not_found("matrix position", distributor_id))?;

        let mut visited = HashSet::from([current.distributor_id.clone()]);
        let mut chain = UplineChain::default();

        while chain.entries.len() < usize::from(max_levels) {
            let Some(parent_id) = current.parent_id.clone() else {
                break;
            };
            let level = chain.entries.len() as u8 + 1;

            if !visited.insert(parent_id.clone()) {
                tracing::error!(
                    distributor_id = %distributor_id,
                    revisited = %parent_id,
                    level,
                    "Cycle detected in upline chain"
                );
                return Err(CommissionError::corrupt(
                    parent_id,
                    format!("revisited at level {} above {}", level, distributor_id),
                ));
            }

            let distributor = self.store.get_distributor(&parent_id).await?;
            if distributor.is_none() {
                tracing::warn!(
                    upline_id = %parent_id,
                    level,
                    "Matrix position references a missing distributor"
                );
            }

            chain.entries.push(UplineEntry {
                level,
                distributor_id: parent_id.clone(),
                distributor,
            });

            if chain.entries.len() == usize::from(max_levels) {
                break;
            }

            match self.store.get_matrix_position(&parent_id).await? {
                Some(position) => current = position,
                None => {
                    tracing::warn!(
                        upline_id = %parent_id,
                        level,
                        "Upline has no matrix position, chain is broken"
                    );
                    chain.broken_at = Some(level);
                    break;
                }
            }
        }

        Ok(chain)
    }

    /// Expand the downline breadth-first and annotate every node
    pub async fn downline_tree(
        &self,
        distributor_id: &str,
        max_depth: u32,
        period: &QualifyingPeriod,
    ) -> CommissionResult<DownlineNode> {
        let root = self
            .store
            .get_matrix_position(distributor_id)
            .await?
            .ok_or_else(|| CommissionError::not_found("matrix position", distributor_id))?;

        let distributor = self.store.get_distributor(&root.distributor_id).await?;
        let personal_sales = self
            .store
            .personal_volume(&root.distributor_id, period)
            .await?;

        let mut arena = vec![ArenaNode {
            distributor,
            personal_sales,
            distributor_id: root.distributor_id.clone(),
            position: root.position,
            depth: 0,
            children: Vec::new(),
        }];
        let mut visited = HashSet::from([root.distributor_id]);
        let mut queue = VecDeque::from([0usize]);

        while let Some(index) = queue.pop_front() {
            if arena[index].depth >= max_depth {
                continue;
            }

            let parent_id = arena[index].distributor_id.clone();
            let mut children = self.store.get_children(&parent_id).await?;
            children.sort_by_key(|c| c.position);

            if let Some(width) = self.matrix_width
                && children.len() > width as usize
            {
                tracing::warn!(
                    parent_id = %parent_id,
                    children = children.len(),
                    width,
                    "Matrix slot holds more children than the configured width"
                );
            }

            for child in children {
                if !visited.insert(child.distributor_id.clone()) {
                    return Err(CommissionError::corrupt(
                        child.distributor_id,
                        format!("reached twice while expanding the downline of {}", distributor_id),
                    ));
                }

                let distributor = self.store.get_distributor(&child.distributor_id).await?;
                let personal_sales = self
                    .store
                    .personal_volume(&child.distributor_id, period)
                    .await?;
                let depth = arena[index].depth + 1;

                let child_index = arena.len();
                arena.push(ArenaNode {
                    distributor_id: child.distributor_id,
                    distributor,
                    position: child.position,
                    depth,
                    personal_sales,
                    children: Vec::new(),
                });
                arena[index].children.push(child_index);
                queue.push_back(child_index);
            }
        }

        // Breadth-first order puts every child after its parent, so a reverse
        // sweep finishes each subtree before its parent needs it
        let mut built: Vec<Option<DownlineNode>> = Vec::with_capacity(arena.len());
        built.resize_with(arena.len(), || None);

        for index in (0..arena.len()).rev() {
            let node = &arena[index];
            let children: Vec<DownlineNode> = node
                .children
                .iter()
                .filter_map(|&c| built[c].take())
                .collect();

            let team_volume =
                node.personal_sales + children.iter().map(|c| c.team_volume).sum::<Decimal>();
            let active_legs = children
                .iter()
                .filter(|c| c.team_volume > Decimal::ZERO)
                .count() as u32;

            built[index] = Some(DownlineNode {
                distributor_id: node.distributor_id.clone(),
                distributor: node.distributor.clone(),
                position: node.position,
                depth: node.depth,
                personal_sales: node.personal_sales,
                team_volume,
                active_legs,
                children,
            });
        }

        built[0]
            .take()
            .ok_or_else(|| CommissionError::not_found("matrix position", distributor_id))
    }
}
