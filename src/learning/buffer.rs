use crate::game::role::Role;
use crate::game::transition::Transition;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::VecDeque;

/// A fixed-capacity FIFO pool. Pushing onto a full pool silently evicts
/// the oldest element, so the newest `capacity` items always win.
#[derive(Debug, Clone)]
pub struct PoolDeque<T> {
    pool: VecDeque<T>,
    capacity: usize,
}

impl<T> PoolDeque<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be positive");
        Self {
            pool: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.pool.len() == self.capacity {
            self.pool.pop_front();
        }
        self.pool.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
    pub fn is_full(&self) -> bool {
        self.pool.len() == self.capacity
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn clear(&mut self) {
        self.pool.clear();
    }
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pool.iter()
    }
}

impl<T> std::ops::Index<usize> for PoolDeque<T> {
    type Output = T;
    fn index(&self, index: usize) -> &T {
        assert!(index < self.pool.len(), "pool index {} out of range", index);
        &self.pool[index]
    }
}

/// Experience replay storage: one bounded pool per (role, agent), plus a
/// generator for drawing training batches without replacement.
#[derive(Debug)]
pub struct ReplayBuffer {
    pools: Vec<Vec<PoolDeque<Transition>>>,
    rng: SmallRng,
}

impl ReplayBuffer {
    pub fn new(population: usize, capacity: usize) -> Self {
        let pools = Role::all()
            .iter()
            .map(|_| (0..population).map(|_| PoolDeque::new(capacity)).collect())
            .collect();
        Self {
            pools,
            rng: SmallRng::from_os_rng(),
        }
    }

    fn pool(&self, role: Role, agent: usize) -> &PoolDeque<Transition> {
        let pools = &self.pools[role.index()];
        assert!(agent < pools.len(), "agent index {} out of range", agent);
        &pools[agent]
    }

    pub fn add(&mut self, role: Role, agent: usize, t: Transition) {
        let pools = &mut self.pools[role.index()];
        assert!(agent < pools.len(), "agent index {} out of range", agent);
        pools[agent].push(t);
    }

    pub fn len(&self, role: Role, agent: usize) -> usize {
        self.pool(role, agent).len()
    }

    pub fn is_empty(&self, role: Role, agent: usize) -> bool {
        self.pool(role, agent).is_empty()
    }

    /// Draw `batch` distinct experiences uniformly from one pool. Asking
    /// for more than the pool holds is a caller bug.
    pub fn sample(&mut self, role: Role, agent: usize, batch: usize) -> Vec<Transition> {
        let len = self.len(role, agent);
        assert!(
            batch <= len,
            "batch of {} exceeds {} stored experiences",
            batch,
            len
        );
        let picks = rand::seq::index::sample(&mut self.rng, len, batch);
        let pool = &self.pools[role.index()][agent];
        picks.into_iter().map(|i| pool[i].clone()).collect()
    }

    /// Forget everything. Called between episodes.
    pub fn clear(&mut self) {
        for pools in self.pools.iter_mut() {
            for pool in pools.iter_mut() {
                pool.clear();
            }
        }
    }
}
