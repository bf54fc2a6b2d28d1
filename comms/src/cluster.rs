//! Static single-machine cluster layout.
//!
//! Every process derives the same endpoint map from the same two integers, so
//! there is no discovery step: the parameter server binds its assigned port
//! and the workers dial it.

use std::{
    fmt::{self, Display},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    str::FromStr,
};

/// First port handed out; parameter servers take the low ports, workers the
/// ports right after them.
pub const BASE_PORT: u16 = 12222;

const HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// The job a process performs within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Ps,
    Worker,
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Ps => write!(f, "ps"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ps" => Ok(Role::Ps),
            "worker" => Ok(Role::Worker),
            other => Err(format!("unknown role '{other}', expected 'ps' or 'worker'")),
        }
    }
}

/// The mapping from role to the loopback endpoints of its tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    ps: Vec<SocketAddr>,
    workers: Vec<SocketAddr>,
}

impl ClusterSpec {
    /// Creates a new `ClusterSpec`.
    ///
    /// Ports are allocated sequentially from `BASE_PORT`: one per parameter
    /// server task first, then one per worker task.
    ///
    /// # Arguments
    /// * `num_workers` - The amount of worker tasks.
    /// * `num_ps` - The amount of parameter server tasks.
    ///
    /// # Returns
    /// A new `ClusterSpec` instance.
    pub fn new(num_workers: usize, num_ps: usize) -> Self {
        let mut port = BASE_PORT;
        let mut next = || {
            let addr = SocketAddr::V4(SocketAddrV4::new(HOST, port));
            port += 1;
            addr
        };

        let ps = (0..num_ps).map(|_| next()).collect();
        let workers = (0..num_workers).map(|_| next()).collect();

        Self { ps, workers }
    }

    /// Returns the endpoints of the parameter server tasks.
    pub fn ps(&self) -> &[SocketAddr] {
        &self.ps
    }

    /// Returns the endpoints of the worker tasks.
    pub fn workers(&self) -> &[SocketAddr] {
        &self.workers
    }

    /// Looks up the endpoint assigned to one task.
    ///
    /// # Arguments
    /// * `role` - The task's role.
    /// * `task_index` - The task's index within that role.
    ///
    /// # Returns
    /// The endpoint, or `None` if `task_index` is out of range for the role.
    pub fn endpoint(&self, role: Role, task_index: usize) -> Option<SocketAddr> {
        let tasks = match role {
            Role::Ps => &self.ps,
            Role::Worker => &self.workers,
        };

        tasks.get(task_index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_counts_match_requested() {
        let spec = ClusterSpec::new(2, 1);
        assert_eq!(spec.workers().len(), 2);
        assert_eq!(spec.ps().len(), 1);
    }

    #[test]
    fn ports_are_sequential_ps_first() {
        let spec = ClusterSpec::new(2, 1);

        assert_eq!(spec.ps()[0].port(), BASE_PORT);
        assert_eq!(spec.workers()[0].port(), BASE_PORT + 1);
        assert_eq!(spec.workers()[1].port(), BASE_PORT + 2);
    }

    #[test]
    fn layout_is_deterministic() {
        assert_eq!(ClusterSpec::new(3, 2), ClusterSpec::new(3, 2));
    }

    #[test]
    fn no_two_endpoints_collide() {
        let spec = ClusterSpec::new(4, 2);
        let mut all: Vec<_> = spec.ps().iter().chain(spec.workers()).collect();

        all.sort();
        all.dedup();
        assert_eq!(all.len(), 6);
    }

    #[test]
    fn endpoint_lookup() {
        let spec = ClusterSpec::new(2, 1);

        assert_eq!(spec.endpoint(Role::Ps, 0), Some(spec.ps()[0]));
        assert_eq!(spec.endpoint(Role::Worker, 1), Some(spec.workers()[1]));
        assert_eq!(spec.endpoint(Role::Worker, 2), None);
    }

    #[test]
    fn role_parses_and_displays() {
        assert_eq!("ps".parse::<Role>().unwrap(), Role::Ps);
        assert_eq!("worker".parse::<Role>().unwrap(), Role::Worker);
        assert!("chief".parse::<Role>().is_err());
        assert_eq!(Role::Worker.to_string(), "worker");
    }
}
