//! Union-find with path compression and union-by-rank, used by the save
//! planner to detect cycle-closing edges while building a max-weight
//! spanning forest.

use crate::error::{Error, Result};

/// A disjoint-set forest over the elements `0..n`.
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl DisjointSet {
    /// Creates a forest of `n` singleton sets, each its own root.
    pub fn new(n: usize) -> Self {
        DisjointSet {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    /// Returns the representative of the set containing `x`, compressing the
    /// path from `x` to the root along the way.
    pub fn find(&mut self, x: usize) -> Result<usize> {
        self.check(x)?;
        Ok(self.find_unchecked(x))
    }

    fn find_unchecked(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find_unchecked(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    /// Unites the sets containing `x` and `y`, attaching the shorter tree
    /// under the taller one's root.
    pub fn union(&mut self, x: usize, y: usize) -> Result<()> {
        self.check(x)?;
        self.check(y)?;

        let rx = self.find_unchecked(x);
        let ry = self.find_unchecked(y);
        if rx == ry {
            return Ok(());
        }

        match self.rank[rx].cmp(&self.rank[ry]) {
            std::cmp::Ordering::Less => self.parent[rx] = ry,
            std::cmp::Ordering::Greater => self.parent[ry] = rx,
            std::cmp::Ordering::Equal => {
                self.parent[ry] = rx;
                self.rank[rx] += 1;
            }
        }
        Ok(())
    }

    fn check(&self, x: usize) -> Result<()> {
        if x >= self.parent.len() {
            Err(Error::Invalid("disjoint-set element out of range"))
        } else {
            Ok(())
        }
    }
}
